//! Common error types for Lockbox.

use thiserror::Error;

/// Top-level error type for Lockbox operations.
///
/// A cancelled file pick is not represented here: the import pipeline
/// reports it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum Error {
    /// Reading the bytes behind a picked file failed.
    #[error("Unreadable source: {0}")]
    UnreadableSource(String),

    /// Cryptographic operation failed.
    ///
    /// Decryption failures always carry the same message regardless of cause.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Keystore or key-value store rejected a read or write.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// The single error reported for every decryption failure.
    pub fn decryption_failed() -> Self {
        Error::Crypto("decryption failed".to_string())
    }

    /// Check whether this is a `NotFound` error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
