//! Common error types for CloudBox.

use thiserror::Error;

/// Top-level error type for CloudBox operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Obtaining, refreshing or using a credential failed.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Transport or remote API failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Remote resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The remote side refused access.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
