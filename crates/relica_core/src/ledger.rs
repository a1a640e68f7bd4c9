//! The change ledger.

use crate::change::{change_id, revision, ChangeRecord};
use crate::error::CoreResult;
use relica_storage::{Filter, Record, RecordStore};
use std::sync::Arc;

/// Store of change records for one tracked model.
///
/// Entries live in the same [`RecordStore`] as the tracked records, under the
/// model name `"{model}-change"`, keyed by [`change_id`]. Because the key is
/// derived from the tracked record's id, writing an entry is always an upsert
/// of the single entry for that record.
pub struct ChangeLedger {
    store: Arc<dyn RecordStore>,
    model_name: String,
    change_model: String,
}

impl ChangeLedger {
    /// Creates the ledger for `model_name` in `store`.
    pub fn new(store: Arc<dyn RecordStore>, model_name: impl Into<String>) -> Self {
        let model_name = model_name.into();
        let change_model = format!("{model_name}-change");
        Self {
            store,
            model_name,
            change_model,
        }
    }

    /// Returns the model name change records are stored under.
    pub fn change_model(&self) -> &str {
        &self.change_model
    }

    /// Returns the entry for a tracked record, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or the entry is malformed.
    pub fn get(&self, record_id: &str) -> CoreResult<Option<ChangeRecord>> {
        self.store
            .find_by_id(&self.change_model, &change_id(&self.model_name, record_id))?
            .map(|record| decode(&record))
            .transpose()
    }

    /// Writes an entry, replacing any existing entry for the same record.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be persisted.
    pub fn put(&self, change: &ChangeRecord) -> CoreResult<()> {
        self.store
            .save(&self.change_model, Record::from_serialize(change)?)?;
        Ok(())
    }

    /// Returns every entry with `checkpoint > since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn since(&self, since: i64) -> CoreResult<Vec<ChangeRecord>> {
        self.query(&Filter::new().where_gt("checkpoint", since))
    }

    /// Returns the entries for the given tracked record ids.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn for_records<'a, I>(&self, record_ids: I) -> CoreResult<Vec<ChangeRecord>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.query(&Filter::new().where_in("record_id", record_ids))
    }

    /// Returns every entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn all(&self) -> CoreResult<Vec<ChangeRecord>> {
        self.query(&Filter::new())
    }

    /// Recomputes and persists the entry for one tracked record.
    ///
    /// `current` is the record as stored right now (`None` if it no longer
    /// exists). `checkpoint` is only consulted when the entry actually
    /// changes. Returns the written entry, or `None` when nothing had to be
    /// written: either the revision is unchanged, or the record was never
    /// tracked and does not exist.
    ///
    /// `prev` only moves forward when the entry crosses into a newer
    /// checkpoint. Rewrites within the epoch the entry was stamped in keep
    /// its `prev`, so peers that saw the last replicated revision still
    /// find the new entry based on it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    pub fn rectify<F>(
        &self,
        record_id: &str,
        current: Option<&Record>,
        checkpoint: F,
    ) -> CoreResult<Option<ChangeRecord>>
    where
        F: FnOnce() -> CoreResult<i64>,
    {
        let rev = current.map(revision);
        let existing = self.get(record_id)?;

        match &existing {
            Some(entry) if entry.rev == rev => return Ok(None),
            None if rev.is_none() => return Ok(None),
            _ => {}
        }

        let is_new = existing.is_none();
        let mut change =
            existing.unwrap_or_else(|| ChangeRecord::new(self.model_name.as_str(), record_id));
        let checkpoint = checkpoint()?;
        if is_new || change.checkpoint < checkpoint {
            change.prev = change.rev.take();
        }
        change.rev = rev;
        change.checkpoint = checkpoint;
        self.put(&change)?;

        tracing::trace!(
            model = %self.model_name,
            record_id,
            change_type = %change.change_type(),
            checkpoint = change.checkpoint,
            "change rectified"
        );
        Ok(Some(change))
    }

    fn query(&self, filter: &Filter) -> CoreResult<Vec<ChangeRecord>> {
        self.store
            .find(&self.change_model, filter)?
            .iter()
            .map(decode)
            .collect()
    }
}

impl std::fmt::Debug for ChangeLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeLedger")
            .field("model_name", &self.model_name)
            .field("change_model", &self.change_model)
            .finish_non_exhaustive()
    }
}

fn decode(record: &Record) -> CoreResult<ChangeRecord> {
    Ok(record.deserialize_into()?)
}
