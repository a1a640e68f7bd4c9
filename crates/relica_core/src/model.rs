//! Tracked models.
//!
//! A [`TrackedModel`] is the context object for change tracking: one model
//! in one store, with its ledger, its checkpoint source and its
//! configuration. Every write made through it is followed by rectification.

use crate::change::{ChangeRecord, ChangeType};
use crate::checkpoint::{Checkpoint, CheckpointSequencer};
use crate::config::TrackingConfig;
use crate::diff::{diff_changes, DiffResult};
use crate::error::{CoreError, CoreResult};
use crate::ledger::ChangeLedger;
use crate::update::{apply_updates, materialize, Update};
use relica_storage::{Filter, Record, RecordStore};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

/// Counts from one maintenance sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Records looked at.
    pub examined: usize,
    /// Records whose ledger entry had to be rewritten.
    pub rectified: usize,
    /// Records whose rectification failed.
    pub failed: usize,
}

/// A model whose records are change-tracked.
pub struct TrackedModel {
    store: Arc<dyn RecordStore>,
    model_name: String,
    source_id: String,
    ledger: ChangeLedger,
    sequencer: Arc<CheckpointSequencer>,
    config: TrackingConfig,
}

impl TrackedModel {
    /// Tracks `model_name` in `store` with a private checkpoint sequencer.
    pub fn new(store: Arc<dyn RecordStore>, model_name: impl Into<String>) -> Self {
        let model_name = model_name.into();
        let source_id = format!("{}-{}", store.connector_name(), model_name);
        Self {
            ledger: ChangeLedger::new(Arc::clone(&store), model_name.as_str()),
            sequencer: Arc::new(CheckpointSequencer::new(Arc::clone(&store))),
            store,
            model_name,
            source_id,
            config: TrackingConfig::default(),
        }
    }

    /// Uses a shared checkpoint sequencer.
    ///
    /// Models writing to the same store should share one sequencer so that
    /// allocation for a source is serialized across all of them.
    #[must_use]
    pub fn with_sequencer(mut self, sequencer: Arc<CheckpointSequencer>) -> Self {
        self.sequencer = sequencer;
        self
    }

    /// Sets the tracking configuration.
    #[must_use]
    pub fn with_config(mut self, config: TrackingConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the tracked model name.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Returns the checkpoint source id, `"{connector}-{model}"`.
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Returns the change ledger.
    pub fn ledger(&self) -> &ChangeLedger {
        &self.ledger
    }

    /// Returns the tracking configuration.
    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    // =========================================================================
    // Record operations
    // =========================================================================

    /// Inserts a new record. An empty id is replaced by a random UUID.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidRecord`] if the id already exists and
    /// duplicates are rejected, or any storage or rectification error.
    pub fn create(&self, mut record: Record) -> CoreResult<Record> {
        if record.id.is_empty() {
            record.id = uuid::Uuid::new_v4().to_string();
        } else if self.config.reject_duplicate_creates
            && self.store.find_by_id(&self.model_name, &record.id)?.is_some()
        {
            return Err(CoreError::invalid_record(format!(
                "{}/{} already exists",
                self.model_name, record.id
            )));
        }
        self.upsert(record)
    }

    /// Inserts or replaces a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be saved or rectified. When
    /// rectification fails the saved record stays in place.
    pub fn upsert(&self, record: Record) -> CoreResult<Record> {
        let saved = self.store.save(&self.model_name, record)?;
        self.rectify_change(&saved.id)?;
        Ok(saved)
    }

    /// Merges `attributes` into an existing record.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RecordNotFound`] if the record does not exist.
    pub fn update_attributes(&self, id: &str, attributes: Map<String, Value>) -> CoreResult<Record> {
        let mut record = self
            .store
            .find_by_id(&self.model_name, id)?
            .ok_or_else(|| CoreError::record_not_found(self.model_name.as_str(), id))?;
        for (name, value) in attributes {
            record.set(name, value);
        }
        self.upsert(record)
    }

    /// Removes a record. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal or rectification fails.
    pub fn destroy_by_id(&self, id: &str) -> CoreResult<bool> {
        let removed = self.store.destroy(&self.model_name, id)?;
        self.rectify_change(id)?;
        Ok(removed)
    }

    /// Removes every record matching `filter`. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Stops at the first removal or rectification failure.
    pub fn destroy_all(&self, filter: &Filter) -> CoreResult<usize> {
        let doomed = self.store.find(&self.model_name, filter)?;
        let mut removed = 0;
        for record in &doomed {
            if self.store.destroy(&self.model_name, &record.id)? {
                removed += 1;
            }
            self.rectify_change(&record.id)?;
        }
        Ok(removed)
    }

    /// Returns records matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn find(&self, filter: &Filter) -> CoreResult<Vec<Record>> {
        Ok(self.store.find(&self.model_name, filter)?)
    }

    /// Returns a record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn find_by_id(&self, id: &str) -> CoreResult<Option<Record>> {
        Ok(self.store.find_by_id(&self.model_name, id)?)
    }

    // =========================================================================
    // Change tracking
    // =========================================================================

    /// Brings the ledger entry of one record in line with the store.
    ///
    /// Returns the rewritten entry, or `None` if it was already current.
    ///
    /// # Errors
    ///
    /// Returns an error if the record, its entry or the checkpoint cannot be
    /// read or written.
    pub fn rectify_change(&self, id: &str) -> CoreResult<Option<ChangeRecord>> {
        let current = self.store.find_by_id(&self.model_name, id)?;
        self.ledger.rectify(id, current.as_ref(), || {
            self.sequencer.current_or_create(&self.source_id)
        })
    }

    /// Rectifies every tracked record and every stored record without an entry.
    ///
    /// Records are handled independently: a failure is logged and counted
    /// and the sweep moves on.
    ///
    /// # Errors
    ///
    /// Returns an error only if the ids to sweep cannot be listed.
    pub fn rectify_all(&self) -> CoreResult<SweepReport> {
        let mut ids: BTreeSet<String> = self
            .ledger
            .all()?
            .into_iter()
            .map(|change| change.record_id)
            .collect();
        ids.extend(
            self.store
                .find(&self.model_name, &Filter::new())?
                .into_iter()
                .map(|record| record.id),
        );

        let mut report = SweepReport::default();
        for id in &ids {
            report.examined += 1;
            match self.rectify_change(id) {
                Ok(Some(_)) => report.rectified += 1,
                Ok(None) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(model = %self.model_name, record_id = %id, error = %e, "rectify failed");
                }
            }
        }

        tracing::debug!(
            model = %self.model_name,
            examined = report.examined,
            rectified = report.rectified,
            failed = report.failed,
            "rectify sweep finished"
        );
        Ok(report)
    }

    /// Returns changes with `checkpoint > since`, ordered by checkpoint and id.
    ///
    /// With a filter, non-delete changes whose record is outside the
    /// filtered view are dropped. Deletions are always kept. A filter limit
    /// is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger or the store cannot be read.
    pub fn changes_since(&self, since: i64, filter: Option<&Filter>) -> CoreResult<Vec<ChangeRecord>> {
        let mut changes = self.ledger.since(since)?;
        changes.sort_by(|a, b| {
            a.checkpoint
                .cmp(&b.checkpoint)
                .then_with(|| a.record_id.cmp(&b.record_id))
        });

        let Some(filter) = filter.filter(|f| !f.is_empty()) else {
            return Ok(changes);
        };

        let live_ids: HashSet<&str> = changes
            .iter()
            .filter(|c| c.rev.is_some())
            .map(|c| c.record_id.as_str())
            .collect();
        let view = filter
            .conditions()
            .fold(Filter::new(), |view, (field, condition)| {
                view.with_condition(field, condition.clone())
            });
        let visible: HashSet<String> = self
            .store
            .find(&self.model_name, &view)?
            .into_iter()
            .map(|record| record.id)
            .filter(|id| live_ids.contains(id.as_str()))
            .collect();

        changes.retain(|c| c.rev.is_none() || visible.contains(&c.record_id));
        Ok(changes)
    }

    /// Diffs this model's changes since `since` against a peer's entries.
    ///
    /// Deltas are local changes the peer is missing or behind on.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read.
    pub fn diff(&self, since: i64, remote: &[ChangeRecord]) -> CoreResult<DiffResult> {
        let local = self.ledger.since(since)?;
        Ok(diff_changes(since, &local, remote))
    }

    /// Diffs changes offered by a peer against this model's ledger.
    ///
    /// This is the receiving side of a replication round: deltas are the
    /// offered changes (newer than `since`) this model is missing, and
    /// conflicts pair an offered change with the local entry it diverged
    /// from.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read.
    pub fn diff_incoming(&self, since: i64, offered: &[ChangeRecord]) -> CoreResult<DiffResult> {
        let candidates: Vec<&str> = offered
            .iter()
            .filter(|c| c.checkpoint > since)
            .map(|c| c.record_id.as_str())
            .collect();
        if candidates.is_empty() {
            return Ok(DiffResult::default());
        }
        let own = self.ledger.for_records(candidates)?;
        Ok(diff_changes(since, offered, &own))
    }

    /// Materializes deltas into updates using this model's records.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LedgerInconsistency`] if a create or update
    /// delta has no stored record, or any storage error.
    pub fn create_updates(&self, deltas: &[ChangeRecord]) -> CoreResult<Vec<Update>> {
        materialize(deltas, self.config.materialize_fanout, |id| {
            Ok(self.store.find_by_id(&self.model_name, id)?)
        })
    }

    /// Applies updates to this model, one at a time, without a transaction.
    ///
    /// Saves go through [`upsert`](Self::upsert) and deletions through
    /// [`destroy_by_id`](Self::destroy_by_id), so both are idempotent and
    /// rectified. Returns the number of updates applied.
    ///
    /// When anything was applied, a checkpoint is allocated afterwards so
    /// that the received revisions close this model's epoch: a later local
    /// edit is then recorded as based on the revision the peer sent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BulkApply`] at the first failing update. Earlier
    /// updates stay applied.
    pub fn bulk_update(&self, updates: &[Update]) -> CoreResult<usize> {
        let result = self.apply_each(updates);
        let applied = match &result {
            Ok(applied) => *applied,
            Err(CoreError::BulkApply { applied, .. }) => *applied,
            Err(_) => 0,
        };
        if applied > 0 {
            if let Err(e) = self.sequencer.create(&self.source_id) {
                tracing::warn!(
                    model = %self.model_name,
                    applied,
                    error = %e,
                    "could not close epoch after bulk update"
                );
            }
        }
        result
    }

    fn apply_each(&self, updates: &[Update]) -> CoreResult<usize> {
        apply_updates(updates, |update| match (update.kind, &update.data) {
            (ChangeType::Delete, _) => self.destroy_by_id(update.record_id()).map(|_| ()),
            (ChangeType::Create | ChangeType::Update, Some(data)) => {
                if data.id != update.record_id() {
                    return Err(CoreError::invalid_record(format!(
                        "payload id {} does not match change for {}",
                        data.id,
                        update.record_id()
                    )));
                }
                self.upsert(data.clone()).map(|_| ())
            }
            (kind, None) => Err(CoreError::invalid_record(format!(
                "{kind} update for {} carries no data",
                update.record_id()
            ))),
        })
    }

    /// Allocates the next checkpoint for this model's source.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Sequencing`] if allocation fails.
    pub fn checkpoint(&self) -> CoreResult<Checkpoint> {
        self.sequencer.create(&self.source_id)
    }

    /// Returns the current checkpoint for this model's source, or `-1`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn current_checkpoint(&self) -> CoreResult<i64> {
        self.sequencer.current(&self.source_id)
    }
}

impl std::fmt::Debug for TrackedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedModel")
            .field("model_name", &self.model_name)
            .field("source_id", &self.source_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
