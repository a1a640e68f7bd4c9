//! Checkpoint sequencing.
//!
//! A checkpoint is an epoch boundary for one source. Change records are
//! stamped with the checkpoint that was current when they were rectified;
//! advancing the checkpoint marks everything stamped so far as replicated.

use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use relica_storage::{Filter, Record, RecordStore, StorageError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Sentinel returned when a source has no checkpoint yet.
pub const NO_CHECKPOINT: i64 = -1;

/// Model name under which checkpoints are stored.
pub const CHECKPOINT_MODEL: &str = "Checkpoint";

/// An allocated checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// Sequence number, strictly increasing per source.
    pub seq: i64,
    /// Source that owns the sequence.
    pub source_id: String,
    /// Allocation time in milliseconds since the Unix epoch.
    pub time_ms: u64,
}

impl Checkpoint {
    fn key(source_id: &str, seq: i64) -> String {
        format!("{source_id}#{seq}")
    }

    fn to_record(&self) -> Record {
        Record::new(Self::key(&self.source_id, self.seq))
            .with_field("seq", self.seq)
            .with_field("source_id", self.source_id.clone())
            .with_field("time_ms", self.time_ms)
    }

    fn from_record(record: &Record) -> Option<Self> {
        Some(Self {
            seq: record.fields.get("seq")?.as_i64()?,
            source_id: record.fields.get("source_id")?.as_str()?.to_string(),
            time_ms: record
                .fields
                .get("time_ms")
                .and_then(Value::as_u64)
                .unwrap_or(0),
        })
    }
}

/// Allocates checkpoints per source.
///
/// Allocation for one source is serialized by an in-process lock keyed by
/// source id, so concurrent callers always receive distinct, contiguous
/// sequence numbers. Share one sequencer between every
/// [`TrackedModel`](crate::TrackedModel) that writes to the same store.
pub struct CheckpointSequencer {
    store: Arc<dyn RecordStore>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CheckpointSequencer {
    /// Creates a sequencer persisting checkpoints in `store`.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the highest allocated sequence number, or [`NO_CHECKPOINT`].
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn current(&self, source_id: &str) -> CoreResult<i64> {
        let checkpoints = self
            .store
            .find(CHECKPOINT_MODEL, &Filter::new().where_eq("source_id", source_id))?;

        Ok(checkpoints
            .iter()
            .filter_map(Checkpoint::from_record)
            .map(|cp| cp.seq)
            .max()
            .unwrap_or(NO_CHECKPOINT))
    }

    /// Returns the latest checkpoint for a source, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn latest(&self, source_id: &str) -> CoreResult<Option<Checkpoint>> {
        let seq = self.current(source_id)?;
        if seq == NO_CHECKPOINT {
            return Ok(None);
        }
        let record = self
            .store
            .find_by_id(CHECKPOINT_MODEL, &Checkpoint::key(source_id, seq))?;
        Ok(record.as_ref().and_then(Checkpoint::from_record))
    }

    /// Allocates and persists the next checkpoint for a source.
    ///
    /// The first checkpoint of a source has sequence number `0`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Sequencing`] if the checkpoint cannot be read or
    /// persisted. No sequence number is consumed in that case.
    pub fn create(&self, source_id: &str) -> CoreResult<Checkpoint> {
        let lock = self.lock_for(source_id);
        let _guard = lock.lock();
        self.allocate(source_id)
    }

    /// Returns the current sequence number, allocating the first checkpoint
    /// if the source has none yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    pub fn current_or_create(&self, source_id: &str) -> CoreResult<i64> {
        let current = self.current(source_id)?;
        if current != NO_CHECKPOINT {
            return Ok(current);
        }

        let lock = self.lock_for(source_id);
        let _guard = lock.lock();
        // Another caller may have allocated while we waited
        let current = self.current(source_id)?;
        if current != NO_CHECKPOINT {
            return Ok(current);
        }
        Ok(self.allocate(source_id)?.seq)
    }

    /// Allocates the next checkpoint. Caller must hold the source lock.
    fn allocate(&self, source_id: &str) -> CoreResult<Checkpoint> {
        let sequencing = |source: StorageError| CoreError::Sequencing {
            source_id: source_id.to_string(),
            source,
        };

        let previous = match self.current(source_id) {
            Ok(seq) => seq,
            Err(CoreError::Storage(e)) => return Err(sequencing(e)),
            Err(e) => return Err(e),
        };

        let checkpoint = Checkpoint {
            seq: previous + 1,
            source_id: source_id.to_string(),
            time_ms: now_ms(),
        };
        self.store
            .save(CHECKPOINT_MODEL, checkpoint.to_record())
            .map_err(sequencing)?;

        tracing::debug!(source_id, seq = checkpoint.seq, "checkpoint allocated");
        Ok(checkpoint)
    }

    fn lock_for(&self, source_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .lock()
                .entry(source_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}

impl std::fmt::Debug for CheckpointSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointSequencer")
            .field("connector", &self.store.connector_name())
            .finish_non_exhaustive()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
