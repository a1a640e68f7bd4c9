//! Record store trait definition.

use crate::error::StorageResult;
use crate::filter::Filter;
use crate::record::Record;

/// A persistence backend for Relica records.
///
/// Stores keep records grouped by model name and keyed by id. They do not
/// interpret records beyond evaluating [`Filter`]s. Change-tracking metadata
/// (change records, checkpoints) is stored through this same interface under
/// its own model names.
///
/// # Invariants
///
/// - `save` is an upsert: saving the same record twice leaves one copy
/// - `destroy` of an absent id returns `Ok(false)`, never an error
/// - `find` returns records in ascending id order
/// - Stores must be `Send + Sync` for shared access
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
pub trait RecordStore: Send + Sync {
    /// Returns the stable connector name of this store.
    ///
    /// Combined with a model name it identifies a change-tracking source.
    fn connector_name(&self) -> &str;

    /// Returns all records of `model` matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn find(&self, model: &str, filter: &Filter) -> StorageResult<Vec<Record>>;

    /// Returns the record with the given id, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn find_by_id(&self, model: &str, id: &str) -> StorageResult<Option<Record>>;

    /// Inserts or replaces a record, returning the stored copy.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    fn save(&self, model: &str, record: Record) -> StorageResult<Record>;

    /// Removes a record. Returns whether a record was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal cannot be persisted.
    fn destroy(&self, model: &str, id: &str) -> StorageResult<bool>;

    /// Counts records of `model` matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn count(&self, model: &str, filter: &Filter) -> StorageResult<usize> {
        Ok(self.find(model, filter)?.len())
    }
}
