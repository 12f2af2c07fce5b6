//! Error types for warn-metric evaluation and acknowledgment

use crate::alerts::notifier::NotifierError;
use crate::storage::StoreError;

/// Errors surfaced by `evaluate`, `acknowledge` and dispatch
#[derive(Debug, thiserror::Error)]
pub enum WarnMetricError {
    #[error("Unknown warn metric: {0}")]
    UnknownMetric(String),

    #[error("Warn metric {0} has not fired yet")]
    NotFired(String),

    #[error("Invalid observation for {id}: {reason}")]
    InvalidObservation { id: String, reason: String },

    #[error("Status store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("Corrupt status record for {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Notification dispatch failed: {0}")]
    DispatchFailed(#[from] NotifierError),
}

impl WarnMetricError {
    /// Whether retrying the whole call may succeed.
    ///
    /// A failed dispatch is not: the metric stays fired and a retry only
    /// reports `AlreadyFired`.
    pub fn is_transient(&self) -> bool {
        matches!(self, WarnMetricError::StoreUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_store_errors_are_transient() {
        assert!(WarnMetricError::StoreUnavailable(StoreError::Contention("k".to_string())).is_transient());
        assert!(!WarnMetricError::DispatchFailed(NotifierError::Unavailable("down".to_string())).is_transient());
        assert!(!WarnMetricError::NotFired("x".to_string()).is_transient());
    }
}
