//! Configuration loading for Tether clients

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tether_fabric::transport::DEFAULT_PORT;

use crate::error::{Error, Result};
use crate::target::{Target, LOCALHOST};

/// Client configuration
#[derive(Clone, Debug, Deserialize)]
pub struct ClientConfig {
    /// Identity announced to the server
    #[serde(default = "default_identity")]
    pub identity: String,

    /// Static server address, tried first
    #[serde(default)]
    pub server: Option<String>,

    /// Team number, resolved to the team's well-known addresses
    #[serde(default)]
    pub team: Option<u32>,

    /// Try 127.0.0.1 after the configured targets (default: true)
    #[serde(default = "default_localhost_fallback")]
    pub localhost_fallback: bool,

    /// Port for addresses without one (default: 5810)
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// Connection monitor timing
#[derive(Clone, Debug, Deserialize)]
pub struct MonitorConfig {
    /// Delay before the first scan (default: 500)
    #[serde(default = "default_startup_delay")]
    pub startup_delay_ms: u64,

    /// How long each candidate gets to connect (default: 2500)
    #[serde(default = "default_candidate_timeout")]
    pub candidate_timeout_ms: u64,

    /// Connected-flag poll interval while waiting on a candidate (default: 100)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Link check interval while connected (default: 1000)
    #[serde(default = "default_heartbeat")]
    pub heartbeat_ms: u64,
}

impl MonitorConfig {
    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn candidate_timeout(&self) -> Duration {
        Duration::from_millis(self.candidate_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms.max(1))
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            startup_delay_ms: default_startup_delay(),
            candidate_timeout_ms: default_candidate_timeout(),
            poll_interval_ms: default_poll_interval(),
            heartbeat_ms: default_heartbeat(),
        }
    }
}

// Default value functions
fn default_identity() -> String {
    "tether-client".to_string()
}
fn default_localhost_fallback() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_startup_delay() -> u64 {
    500
}
fn default_candidate_timeout() -> u64 {
    2500
}
fn default_poll_interval() -> u64 {
    100
}
fn default_heartbeat() -> u64 {
    1000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            identity: default_identity(),
            server: None,
            team: None,
            localhost_fallback: default_localhost_fallback(),
            port: default_port(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: ClientConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Candidate list in priority order: static address, team, localhost
    pub fn targets(&self) -> Vec<Target> {
        let mut targets = Vec::new();
        if let Some(server) = &self.server {
            targets.push(Target::address("Static IP", server.clone()));
        }
        if let Some(team) = self.team {
            targets.push(Target::team("Team Number", team));
        }
        if self.localhost_fallback {
            targets.push(Target::address("Localhost", LOCALHOST));
        }
        targets
    }
}
