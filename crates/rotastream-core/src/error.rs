//! Error types for rotastream

use std::path::PathBuf;

/// rotastream error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Destination exists but is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Invalid size: {0}")]
    InvalidSize(String),

    #[error("Invalid frequency: {0}")]
    InvalidFrequency(String),

    #[error("Invalid boundary unit: {0}")]
    InvalidBoundary(String),

    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("Stream halted after an unrecoverable error")]
    Halted,

    #[error("Stream closed")]
    Closed,

    #[error("Watch error: {0}")]
    WatchError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Result type alias for rotastream
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::ConfigError(msg.into())
    }

    pub fn watch<S: Into<String>>(msg: S) -> Self {
        Error::WatchError(msg.into())
    }

    /// Whether a write can never succeed again after this error
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::Halted | Error::Closed)
    }
}
