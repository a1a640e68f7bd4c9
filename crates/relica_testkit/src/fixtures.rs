//! Test fixtures and store helpers.

use relica_storage::{FileStore, Record, RecordStore};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A file-backed store in a temporary directory, removed on drop.
pub struct TempFileStore {
    /// The store instance.
    pub store: FileStore,
    dir: TempDir,
}

impl TempFileStore {
    /// Creates a store with the default connector name.
    pub fn new() -> Self {
        Self::named("file")
    }

    /// Creates a store reporting the given connector name.
    pub fn named(connector: &str) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::open_named(&dir.path().join("relica.log"), connector)
            .expect("Failed to open file store");
        Self { store, dir }
    }

    /// Returns the temporary directory.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the log file path.
    pub fn path(&self) -> PathBuf {
        self.store.path().to_path_buf()
    }

    /// Closes and reopens the store from its log.
    pub fn reopen(self) -> Self {
        let Self { store, dir } = self;
        let connector = store.connector_name().to_string();
        let path = store.path().to_path_buf();
        drop(store);
        let store = FileStore::open_named(&path, &connector).expect("Failed to reopen file store");
        Self { store, dir }
    }
}

impl Default for TempFileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TempFileStore {
    type Target = FileStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Builds a record from `(name, value)` pairs.
///
/// ```rust
/// use relica_testkit::record;
///
/// let todo = record("1", [("title", "milk".into()), ("done", false.into())]);
/// assert_eq!(todo.fields.len(), 2);
/// ```
pub fn record<'a, I>(id: &str, fields: I) -> Record
where
    I: IntoIterator<Item = (&'a str, Value)>,
{
    fields
        .into_iter()
        .fold(Record::new(id), |record, (name, value)| record.with_field(name, value))
}

/// Builds `count` records with ids `"{prefix}{n}"` and a `title` field.
pub fn numbered_records(prefix: &str, count: usize) -> Vec<Record> {
    (0..count)
        .map(|n| {
            Record::new(format!("{prefix}{n}"))
                .with_field("title", format!("item {n}"))
                .with_field("n", n)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_file_store_survives_reopen() {
        let temp = TempFileStore::named("disk");
        temp.save("todo", Record::new("1")).unwrap();
        let path = temp.path();

        let temp = temp.reopen();
        assert_eq!(temp.path(), path);
        assert_eq!(temp.connector_name(), "disk");
        assert!(temp.find_by_id("todo", "1").unwrap().is_some());
    }

    #[test]
    fn numbered_records_are_distinct() {
        let records = numbered_records("r", 3);
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["r0", "r1", "r2"]);
    }
}
