//! Service error types
//!
//! Error taxonomy of the read-side facade. Validation failures on ingestion
//! are not errors; they come back as a failed [`SubmitOutcome`].
//!
//! [`SubmitOutcome`]: crate::service::dto::SubmitOutcome

use crate::query::QueryError;
use crate::store::StoreError;
use thiserror::Error;

/// Suggested retry delay while the service is starting
pub const RETRY_AFTER_SECS: u64 = 120;

/// Errors returned by [`ScrobbleService`](crate::service::ScrobbleService)
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Startup load has not finished
    #[error("Service not ready, retry in {retry_after_secs} seconds")]
    NotReady { retry_after_secs: u64 },

    /// Entity lookup by name failed
    #[error("Not found: {0}")]
    NotFound(String),

    /// Range options or query error
    #[error("Query error: {0}")]
    Query(QueryError),

    /// Store collaborator error, passed through unchanged
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Internal inconsistency
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn not_ready() -> Self {
        ServiceError::NotReady {
            retry_after_secs: RETRY_AFTER_SECS,
        }
    }

    /// Whether the caller should retry later
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::NotReady { .. })
    }

    pub fn is_invalid_range(&self) -> bool {
        matches!(self, ServiceError::Query(QueryError::InvalidRangeSpec(_)))
    }
}

impl From<QueryError> for ServiceError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Store(err) => ServiceError::Store(err),
            other => ServiceError::Query(other),
        }
    }
}

/// Result type for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
