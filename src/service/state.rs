//! Service lifecycle

use serde::{Deserialize, Serialize};

/// Startup state, advanced exactly once per stage
///
/// `NotReady → Healthy` after the store is loaded and the first event time is
/// registered; `Healthy → Complete` after the first medal ledger build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    NotReady,
    Healthy,
    Complete,
}

impl ServiceStatus {
    /// Reads are served from `Healthy` on
    pub fn is_ready(&self) -> bool {
        *self >= ServiceStatus::Healthy
    }

    /// Ledger-derived fields are served once `Complete`
    pub fn is_complete(&self) -> bool {
        *self == ServiceStatus::Complete
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotReady => write!(f, "not ready"),
            Self::Healthy => write!(f, "healthy"),
            Self::Complete => write!(f, "complete"),
        }
    }
}
