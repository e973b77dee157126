//! Prioritized connection candidates.

use std::fmt;
use std::sync::Arc;

use tether_fabric::Endpoint;

use crate::error::{Error, Result};

/// Loopback address tried last by default
pub const LOCALHOST: &str = "127.0.0.1";

/// One candidate endpoint; earlier targets in a list win
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub label: String,
    pub endpoint: Endpoint,
}

impl Target {
    pub fn address(label: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            endpoint: Endpoint::Address(address.into()),
        }
    }

    pub fn team(label: impl Into<String>, team: u32) -> Self {
        Self {
            label: label.into(),
            endpoint: Endpoint::Team(team),
        }
    }

    fn validate(&self) -> Result<()> {
        let reason = match &self.endpoint {
            Endpoint::Address(address) if address.trim().is_empty() => "empty address",
            Endpoint::Team(0) => "team number must be positive",
            _ => return Ok(()),
        };
        Err(Error::InvalidTarget {
            label: self.label.clone(),
            reason: reason.to_string(),
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.endpoint)
    }
}

/// Freeze a priority list, rejecting empty lists and malformed targets
pub fn priority_list(targets: Vec<Target>) -> Result<Arc<[Target]>> {
    if targets.is_empty() {
        return Err(Error::NoTargets);
    }
    for target in &targets {
        target.validate()?;
    }
    Ok(targets.into())
}
