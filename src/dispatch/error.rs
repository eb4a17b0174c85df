//! Error taxonomy for dispatch operations
//!
//! Three aggregate outcomes are distinguished by variant: invalid
//! configuration (rejected before any work starts), cancellation (partial
//! results discarded), and a worker failure promoted to the whole call
//! (fail-fast mode or a worker panic). Per-item failures in collect mode are
//! not errors at the call level; they are recorded as [`ItemFailure`]
//! markers in the returned collection.

use thiserror::Error;

/// Result type alias for dispatcher entry points
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

/// Aggregate outcome of a dispatcher call that did not complete normally
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Invalid parameters, rejected synchronously before any work starts
    #[error("invalid dispatch configuration: {0}")]
    InvalidConfig(String),

    /// The cancellation token was observed; partial results are discarded
    #[error("dispatch cancelled after {completed} of {total} items")]
    Cancelled { completed: usize, total: usize },

    /// A worker failure promoted to the whole call (fail-fast or panic)
    #[error("worker failed: {0}")]
    WorkerFailed(String),
}

/// How the engine reacts to a worker failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Record the failure for that item and keep processing siblings
    #[default]
    Collect,
    /// First failure cancels all siblings and fails the whole call
    FailFast,
}

/// Per-item failure marker captured in collect mode
#[derive(Debug, Clone)]
pub struct ItemFailure {
    /// Position of the item in the input sequence
    pub index: usize,
    /// Rendered error from the worker
    pub message: String,
}

/// Outcome of one work item: the worker's value or its failure marker
pub type ItemResult<R> = std::result::Result<R, ItemFailure>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_is_descriptive() {
        let err = DispatchError::InvalidConfig("concurrency budget must be >= 1".into());
        assert!(err.to_string().contains("concurrency budget"));

        let err = DispatchError::Cancelled {
            completed: 3,
            total: 10,
        };
        assert_eq!(err.to_string(), "dispatch cancelled after 3 of 10 items");
    }

    #[test]
    fn failure_mode_defaults_to_collect() {
        assert_eq!(FailureMode::default(), FailureMode::Collect);
    }
}
