//! Error types for tgview-core

use thiserror::Error;

/// Core library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// The global or a per-chat manifest could not be fetched or parsed.
    #[error("Manifest unavailable: {0}")]
    ManifestUnavailable(String),

    /// A single chunk could not be fetched or parsed.
    #[error("Chunk unavailable: {0}")]
    ChunkUnavailable(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the failed operation can be retried by invoking it again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ChunkUnavailable(_) | Error::Network(_))
    }
}

impl From<::config::ConfigError> for Error {
    fn from(err: ::config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

/// Result type alias using Error.
pub type Result<T> = std::result::Result<T, Error>;
