//! Query error types
//!
//! Defines the error conditions of time-range resolution and chart queries.

use thiserror::Error;

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// Conflicting, missing or unparseable time-range options
    #[error("Invalid range spec: {0}")]
    InvalidRangeSpec(String),

    /// Store layer error
    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),
}

impl QueryError {
    pub(crate) fn range(msg: impl Into<String>) -> Self {
        QueryError::InvalidRangeSpec(msg.into())
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
