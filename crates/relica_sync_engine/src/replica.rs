//! Replicas taking part in replication.

use relica_core::{Checkpoint, ChangeRecord, CoreResult, DiffResult, TrackedModel, Update};
use relica_storage::Filter;
use std::sync::Arc;

/// A replication endpoint.
///
/// Replicas are symmetric: the same value can be the source of one round
/// and the target of the next. A transport layer would implement this trait
/// by forwarding each call to a remote process; [`LocalReplica`] calls a
/// [`TrackedModel`] directly.
pub trait Replica: Send + Sync {
    /// Returns a stable name used in logs, errors and conflict reports.
    fn name(&self) -> &str;

    /// Returns changes with `checkpoint > since`, optionally restricted to a
    /// filtered view (deletions are always kept).
    fn changes_since(&self, since: i64, filter: Option<&Filter>) -> CoreResult<Vec<ChangeRecord>>;

    /// Diffs changes offered by a peer against this replica's ledger.
    ///
    /// The deltas are the offered changes this replica is missing.
    fn diff(&self, since: i64, offered: &[ChangeRecord]) -> CoreResult<DiffResult>;

    /// Materializes deltas into updates from this replica's records.
    fn create_updates(&self, deltas: &[ChangeRecord]) -> CoreResult<Vec<Update>>;

    /// Applies updates to this replica, one at a time. Returns the number applied.
    fn bulk_update(&self, updates: &[Update]) -> CoreResult<usize>;

    /// Advances this replica's checkpoint.
    fn checkpoint(&self) -> CoreResult<Checkpoint>;

    /// Returns this replica's current checkpoint, or `-1`.
    fn current_checkpoint(&self) -> CoreResult<i64>;
}

/// A replica backed by a tracked model in this process.
#[derive(Debug, Clone)]
pub struct LocalReplica {
    name: String,
    model: Arc<TrackedModel>,
}

impl LocalReplica {
    /// Wraps a model. The replica is named after the model's source id.
    pub fn new(model: Arc<TrackedModel>) -> Self {
        Self {
            name: model.source_id().to_string(),
            model,
        }
    }

    /// Overrides the replica name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the wrapped model.
    pub fn model(&self) -> &Arc<TrackedModel> {
        &self.model
    }
}

impl Replica for LocalReplica {
    fn name(&self) -> &str {
        &self.name
    }

    fn changes_since(&self, since: i64, filter: Option<&Filter>) -> CoreResult<Vec<ChangeRecord>> {
        self.model.changes_since(since, filter)
    }

    fn diff(&self, since: i64, offered: &[ChangeRecord]) -> CoreResult<DiffResult> {
        self.model.diff_incoming(since, offered)
    }

    fn create_updates(&self, deltas: &[ChangeRecord]) -> CoreResult<Vec<Update>> {
        self.model.create_updates(deltas)
    }

    fn bulk_update(&self, updates: &[Update]) -> CoreResult<usize> {
        self.model.bulk_update(updates)
    }

    fn checkpoint(&self) -> CoreResult<Checkpoint> {
        self.model.checkpoint()
    }

    fn current_checkpoint(&self) -> CoreResult<i64> {
        self.model.current_checkpoint()
    }
}
