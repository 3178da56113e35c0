//! Error types for the map goals core

use thiserror::Error;

/// Map goals error type
#[derive(Error, Debug)]
pub enum MapGoalsError {
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("Publish failed: {0}")]
    Publish(String),
}

impl From<toml::de::Error> for MapGoalsError {
    fn from(e: toml::de::Error) -> Self {
        MapGoalsError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MapGoalsError>;
