//! In-memory record store.

use crate::error::StorageResult;
use crate::filter::Filter;
use crate::record::Record;
use crate::store::RecordStore;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Default connector name of [`InMemoryStore`].
const DEFAULT_CONNECTOR: &str = "memory";

/// An in-memory record store.
///
/// This store keeps all records in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral replicas that don't need persistence
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use relica_storage::{InMemoryStore, Record, RecordStore};
///
/// let store = InMemoryStore::new();
/// store.save("note", Record::new("n1").with_field("body", "hi")).unwrap();
/// assert!(store.find_by_id("note", "n1").unwrap().is_some());
/// assert!(!store.destroy("note", "missing").unwrap());
/// ```
#[derive(Debug)]
pub struct InMemoryStore {
    connector: String,
    models: RwLock<HashMap<String, BTreeMap<String, Record>>>,
}

impl InMemoryStore {
    /// Creates a new empty store named `memory`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_connector_name(DEFAULT_CONNECTOR)
    }

    /// Creates a new empty store with a custom connector name.
    ///
    /// Two replicas sharing a process need distinct names so that their
    /// checkpoint sequences do not collide.
    #[must_use]
    pub fn with_connector_name(name: impl Into<String>) -> Self {
        Self {
            connector: name.into(),
            models: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the names of all models holding at least one record.
    #[must_use]
    pub fn models(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .models
            .read()
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Returns every record of a model.
    #[must_use]
    pub fn records(&self, model: &str) -> Vec<Record> {
        self.models
            .read()
            .get(model)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Removes all records of all models.
    pub fn clear(&self) {
        self.models.write().clear();
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for InMemoryStore {
    fn connector_name(&self) -> &str {
        &self.connector
    }

    fn find(&self, model: &str, filter: &Filter) -> StorageResult<Vec<Record>> {
        let models = self.models.read();
        let Some(records) = models.get(model) else {
            return Ok(Vec::new());
        };

        let matching = records.values().filter(|r| filter.matches(r)).cloned();
        Ok(match filter.max_results() {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    fn find_by_id(&self, model: &str, id: &str) -> StorageResult<Option<Record>> {
        Ok(self
            .models
            .read()
            .get(model)
            .and_then(|records| records.get(id))
            .cloned())
    }

    fn save(&self, model: &str, record: Record) -> StorageResult<Record> {
        self.models
            .write()
            .entry(model.to_string())
            .or_default()
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn destroy(&self, model: &str, id: &str) -> StorageResult<bool> {
        Ok(self
            .models
            .write()
            .get_mut(model)
            .map(|records| records.remove(id).is_some())
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let store = InMemoryStore::new();
        assert_eq!(store.connector_name(), "memory");
        assert!(store.models().is_empty());
        assert!(store.find("todo", &Filter::new()).unwrap().is_empty());
    }

    #[test]
    fn save_is_upsert() {
        let store = InMemoryStore::new();
        store.save("todo", Record::new("1").with_field("v", 1)).unwrap();
        store.save("todo", Record::new("1").with_field("v", 2)).unwrap();

        let all = store.records("todo");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].fields["v"], 2);
    }

    #[test]
    fn destroy_absent_is_not_an_error() {
        let store = InMemoryStore::new();
        assert!(!store.destroy("todo", "nope").unwrap());

        store.save("todo", Record::new("1")).unwrap();
        assert!(store.destroy("todo", "1").unwrap());
        assert!(!store.destroy("todo", "1").unwrap());
    }

    #[test]
    fn find_applies_filter_and_limit() {
        let store = InMemoryStore::new();
        for i in 0..10 {
            store
                .save("n", Record::new(format!("{i:02}")).with_field("n", i))
                .unwrap();
        }

        let found = store.find("n", &Filter::new().where_gte("n", 5)).unwrap();
        assert_eq!(found.len(), 5);
        assert_eq!(found[0].id, "05");

        let limited = store.find("n", &Filter::new().limit(3)).unwrap();
        let ids: Vec<_> = limited.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["00", "01", "02"]);

        assert_eq!(store.count("n", &Filter::new().where_lt("n", 2)).unwrap(), 2);
    }

    #[test]
    fn models_are_isolated() {
        let store = InMemoryStore::new();
        store.save("a", Record::new("1")).unwrap();
        store.save("b", Record::new("1")).unwrap();
        store.destroy("a", "1").unwrap();

        assert!(store.find_by_id("a", "1").unwrap().is_none());
        assert!(store.find_by_id("b", "1").unwrap().is_some());
        assert_eq!(store.models(), vec!["b".to_string()]);
    }

    #[test]
    fn custom_connector_name() {
        let store = InMemoryStore::with_connector_name("client");
        assert_eq!(store.connector_name(), "client");
    }

    #[test]
    fn clear_removes_everything() {
        let store = InMemoryStore::new();
        store.save("a", Record::new("1")).unwrap();
        store.clear();
        assert!(store.records("a").is_empty());
    }
}
