//! Error types for the sync engine.

use crate::replicator::ReplicationStep;
use relica_core::CoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during replication.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A pipeline step failed. Nothing after it ran and the checkpoint was
    /// not advanced.
    #[error("{step} failed replicating {source_replica} -> {target_replica}: {error}")]
    Step {
        /// The failing step.
        step: ReplicationStep,
        /// Name of the source replica.
        source_replica: String,
        /// Name of the target replica.
        target_replica: String,
        /// The underlying failure.
        #[source]
        error: CoreError,
    },

    /// Another round is already running on this replicator.
    #[error("a replication round from {source_replica} is already in progress")]
    RoundInProgress {
        /// Name of the source replica.
        source_replica: String,
    },

    /// The round was cancelled before the checkpoint was advanced.
    #[error("replication cancelled")]
    Cancelled,

    /// Core error outside a replication round.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl SyncError {
    /// Returns the failing step, if the error came from one.
    pub fn step(&self) -> Option<ReplicationStep> {
        match self {
            SyncError::Step { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Returns true if this error can be retried.
    ///
    /// A retried round should start from the same `since` value.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Step { error, .. } => error.is_retryable(),
            SyncError::RoundInProgress { .. } => true,
            SyncError::Cancelled => false,
            SyncError::Core(error) => error.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relica_storage::StorageError;

    fn step_error(error: CoreError) -> SyncError {
        SyncError::Step {
            step: ReplicationStep::BulkUpdate,
            source_replica: "memory-todo".into(),
            target_replica: "file-todo".into(),
            error,
        }
    }

    #[test]
    fn retryable_errors() {
        assert!(step_error(StorageError::unavailable("offline").into()).is_retryable());
        assert!(!step_error(CoreError::ledger_inconsistency("todo", "1")).is_retryable());
        assert!(SyncError::RoundInProgress {
            source_replica: "memory-todo".into()
        }
        .is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
    }

    #[test]
    fn error_display_names_step_and_replicas() {
        let err = step_error(StorageError::unavailable("offline").into());
        let message = err.to_string();
        assert!(message.contains("bulk_update"));
        assert!(message.contains("memory-todo -> file-todo"));
        assert_eq!(err.step(), Some(ReplicationStep::BulkUpdate));
        assert_eq!(SyncError::Cancelled.step(), None);
    }
}
