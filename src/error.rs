//! Error types for the rates stream consumers

use thiserror::Error;

/// Rates feed and dashboard errors
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Feed responded with status {0}")]
    Status(u16),

    #[error("Feed rejected the request: {0}")]
    Remote(String),

    #[error("Failed to decode frame: {0}")]
    Decode(String),

    #[error("Invalid currency pair: {0}")]
    InvalidPair(String),

    #[error("Preference storage error: {0}")]
    Preferences(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("Consumer has been shut down")]
    ConsumerClosed,
}

impl FeedError {
    /// Stable label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            FeedError::Transport(_) => "transport",
            FeedError::Status(_) => "status",
            FeedError::Remote(_) => "remote",
            FeedError::Decode(_) => "decode",
            FeedError::InvalidPair(_) => "invalid_pair",
            FeedError::Preferences(_) => "preferences",
            FeedError::Config(_) => "config",
            FeedError::Metrics(_) => "metrics",
            FeedError::ConsumerClosed => "closed",
        }
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => FeedError::Status(status.as_u16()),
            None => FeedError::Transport(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Decode(err.to_string())
    }
}

impl From<std::io::Error> for FeedError {
    fn from(err: std::io::Error) -> Self {
        FeedError::Preferences(err.to_string())
    }
}

impl From<config::ConfigError> for FeedError {
    fn from(err: config::ConfigError) -> Self {
        FeedError::Config(err.to_string())
    }
}

impl From<prometheus::Error> for FeedError {
    fn from(err: prometheus::Error) -> Self {
        FeedError::Metrics(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;
