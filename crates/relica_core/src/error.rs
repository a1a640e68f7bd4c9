//! Error types for Relica core.

use relica_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in change tracking and replication primitives.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The change ledger claims a record exists but the store has no such record.
    #[error("ledger inconsistency: change for {model}/{record_id} has no stored record")]
    LedgerInconsistency {
        /// Tracked model name.
        model: String,
        /// Record the ledger refers to.
        record_id: String,
    },

    /// A checkpoint could not be allocated.
    #[error("checkpoint allocation failed for source {source_id}: {source}")]
    Sequencing {
        /// Source whose sequence was being advanced.
        source_id: String,
        /// Underlying storage failure.
        #[source]
        source: StorageError,
    },

    /// Record not found.
    #[error("record not found: {model}/{record_id}")]
    RecordNotFound {
        /// Model searched.
        model: String,
        /// Record id that was not found.
        record_id: String,
    },

    /// The record or update cannot be used as given.
    #[error("invalid record: {message}")]
    InvalidRecord {
        /// Description of the problem.
        message: String,
    },

    /// Applying an update list stopped part-way through.
    #[error("bulk update stopped at update {index} after applying {applied}: {source}")]
    BulkApply {
        /// Index of the failing update.
        index: usize,
        /// Number of updates applied (and left in place) before the failure.
        applied: usize,
        /// The failure.
        #[source]
        source: Box<CoreError>,
    },
}

impl CoreError {
    /// Creates a ledger inconsistency error.
    pub fn ledger_inconsistency(model: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self::LedgerInconsistency {
            model: model.into(),
            record_id: record_id.into(),
        }
    }

    /// Creates a record not found error.
    pub fn record_not_found(model: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self::RecordNotFound {
            model: model.into(),
            record_id: record_id.into(),
        }
    }

    /// Creates an invalid record error.
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Returns true if repeating the failed operation may succeed.
    ///
    /// Ledger inconsistencies need manual reconciliation and are never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::Storage(e) => e.is_transient(),
            CoreError::Sequencing { .. } => true,
            CoreError::BulkApply { source, .. } => source.is_retryable(),
            CoreError::LedgerInconsistency { .. }
            | CoreError::RecordNotFound { .. }
            | CoreError::InvalidRecord { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(CoreError::Storage(StorageError::unavailable("busy")).is_retryable());
        assert!(CoreError::Sequencing {
            source_id: "memory-todo".into(),
            source: StorageError::unavailable("busy"),
        }
        .is_retryable());
        assert!(!CoreError::ledger_inconsistency("todo", "1").is_retryable());
        assert!(!CoreError::invalid_record("no payload").is_retryable());
    }

    #[test]
    fn bulk_apply_inherits_retryability() {
        let transient = CoreError::BulkApply {
            index: 1,
            applied: 1,
            source: Box::new(CoreError::Storage(StorageError::unavailable("busy"))),
        };
        assert!(transient.is_retryable());

        let fatal = CoreError::BulkApply {
            index: 0,
            applied: 0,
            source: Box::new(CoreError::invalid_record("no payload")),
        };
        assert!(!fatal.is_retryable());
    }

    #[test]
    fn error_display() {
        let err = CoreError::ledger_inconsistency("todo", "42");
        assert!(err.to_string().contains("todo/42"));
    }
}
