use thiserror::Error;

use crate::registry::TopicKind;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No connection targets configured")]
    NoTargets,

    #[error("Invalid target {label}: {reason}")]
    InvalidTarget { label: String, reason: String },

    #[error("Topic {path} is already registered as a {existing} topic")]
    TopicKindConflict { path: String, existing: TopicKind },

    #[error("Client closed")]
    Closed,

    #[error("Transport error: {0}")]
    Transport(#[from] tether_fabric::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
