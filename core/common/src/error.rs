//! Common error types for offsync.

use thiserror::Error;

/// Top-level error type for offsync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The sync subsystem is wired incorrectly (e.g. no handler for an entity type).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The remote could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// The remote was reached but failed the request.
    #[error("Remote error: {0}")]
    Remote(String),

    /// Local store operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

impl Error {
    /// Whether a later attempt of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Remote(_) | Error::Io(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
