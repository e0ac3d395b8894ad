//! Store error types
//!
//! Defines all errors the store collaborator can report. The read-side engine
//! never swallows these; they propagate to the caller unchanged.

use thiserror::Error;

/// Errors that can occur in the store
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A scrobble the store refuses to record
    #[error("Invalid scrobble: {0}")]
    InvalidScrobble(String),

    /// Snapshot contents are inconsistent
    #[error("Corrupt data: {0}")]
    Corruption(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
