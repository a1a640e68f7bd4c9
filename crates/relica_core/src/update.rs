//! Update materialization and application.

use crate::change::{ChangeRecord, ChangeType};
use crate::error::{CoreError, CoreResult};
use relica_storage::Record;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// A concrete operation derived from a delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Kind of change to apply.
    pub kind: ChangeType,
    /// The delta this update was materialized from.
    pub change: ChangeRecord,
    /// Full record payload. `None` for deletions.
    pub data: Option<Record>,
}

impl Update {
    /// Creates a deletion update. Only the record id is needed to apply it.
    pub fn delete(change: ChangeRecord) -> Self {
        Self {
            kind: ChangeType::Delete,
            change,
            data: None,
        }
    }

    /// Creates a save update carrying the record payload.
    pub fn save(change: ChangeRecord, data: Record) -> Self {
        Self {
            kind: change.change_type(),
            change,
            data: Some(data),
        }
    }

    /// Returns the id of the affected record.
    pub fn record_id(&self) -> &str {
        &self.change.record_id
    }
}

/// Expands deltas into updates, fetching payloads through `fetch`.
///
/// Fetches run on up to `fanout` scoped worker threads. The output keeps
/// the order of `deltas`. The first fetch that fails, or that finds no
/// record for a create or update, stops the remaining workers and fails the
/// whole call; no partial list is returned.
///
/// # Errors
///
/// Returns [`CoreError::LedgerInconsistency`] for a missing record, or the
/// error returned by `fetch`.
pub fn materialize<F>(deltas: &[ChangeRecord], fanout: usize, fetch: F) -> CoreResult<Vec<Update>>
where
    F: Fn(&str) -> CoreResult<Option<Record>> + Sync,
{
    if deltas.is_empty() {
        return Ok(Vec::new());
    }

    let abort = AtomicBool::new(false);
    let workers = fanout.clamp(1, deltas.len());
    if workers == 1 {
        return materialize_chunk(deltas, &fetch, &abort);
    }

    let chunk_size = deltas.len().div_ceil(workers);
    let parts = thread::scope(|scope| {
        let handles: Vec<_> = deltas
            .chunks(chunk_size)
            .map(|chunk| {
                let fetch = &fetch;
                let abort = &abort;
                scope.spawn(move || materialize_chunk(chunk, fetch, abort))
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            })
            .collect::<Vec<_>>()
    });

    let mut updates = Vec::with_capacity(deltas.len());
    for part in parts {
        updates.extend(part?);
    }
    Ok(updates)
}

fn materialize_chunk<F>(
    chunk: &[ChangeRecord],
    fetch: &F,
    abort: &AtomicBool,
) -> CoreResult<Vec<Update>>
where
    F: Fn(&str) -> CoreResult<Option<Record>> + Sync,
{
    let mut updates = Vec::with_capacity(chunk.len());
    for change in chunk {
        // Another worker failed; the result will be discarded
        if abort.load(Ordering::Relaxed) {
            break;
        }

        if change.change_type() == ChangeType::Delete {
            updates.push(Update::delete(change.clone()));
            continue;
        }

        match fetch(&change.record_id) {
            Ok(Some(data)) => updates.push(Update::save(change.clone(), data)),
            Ok(None) => {
                abort.store(true, Ordering::Relaxed);
                tracing::error!(
                    model = %change.model_name,
                    record_id = %change.record_id,
                    rev = ?change.rev,
                    "missing data for change"
                );
                return Err(CoreError::ledger_inconsistency(
                    change.model_name.as_str(),
                    change.record_id.as_str(),
                ));
            }
            Err(e) => {
                abort.store(true, Ordering::Relaxed);
                return Err(e);
            }
        }
    }
    Ok(updates)
}

/// Applies updates one at a time through `apply`.
///
/// There is no transaction around the list. Updates before a failure stay
/// applied and updates after it are never attempted. Returns the number of
/// updates applied.
///
/// # Errors
///
/// Returns [`CoreError::BulkApply`] carrying the index of the failing
/// update and the number applied before it.
pub fn apply_updates<F>(updates: &[Update], mut apply: F) -> CoreResult<usize>
where
    F: FnMut(&Update) -> CoreResult<()>,
{
    for (index, update) in updates.iter().enumerate() {
        if let Err(e) = apply(update) {
            tracing::warn!(
                index,
                applied = index,
                record_id = update.record_id(),
                error = %e,
                "bulk update stopped"
            );
            return Err(CoreError::BulkApply {
                index,
                applied: index,
                source: Box::new(e),
            });
        }
    }
    Ok(updates.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relica_storage::StorageError;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    fn create(id: &str) -> ChangeRecord {
        ChangeRecord::new("todo", id).with_revisions(Some("r1"), None)
    }

    fn delete(id: &str) -> ChangeRecord {
        ChangeRecord::new("todo", id).with_revisions(None, Some("r1"))
    }

    fn records(ids: &[&str]) -> HashMap<String, Record> {
        ids.iter()
            .map(|id| (id.to_string(), Record::new(*id).with_field("title", *id)))
            .collect()
    }

    #[test]
    fn empty_deltas_need_no_fetch() {
        let updates = materialize(&[], 4, |_| panic!("no fetch expected")).unwrap();
        assert!(updates.is_empty());
    }

    #[test]
    fn deletes_are_not_fetched() {
        let fetches = AtomicUsize::new(0);
        let deltas = vec![delete("1"), delete("2")];
        let updates = materialize(&deltas, 4, |_| {
            fetches.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        })
        .unwrap();

        assert_eq!(fetches.load(Ordering::SeqCst), 0);
        assert!(updates.iter().all(|u| u.kind == ChangeType::Delete && u.data.is_none()));
    }

    #[test]
    fn output_keeps_delta_order() {
        let ids: Vec<String> = (0..37).map(|i| i.to_string()).collect();
        let store = records(&ids.iter().map(String::as_str).collect::<Vec<_>>());
        let deltas: Vec<_> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| if i % 5 == 0 { delete(id) } else { create(id) })
            .collect();

        let updates = materialize(&deltas, 4, |id| Ok(store.get(id).cloned())).unwrap();

        let got: Vec<_> = updates.iter().map(Update::record_id).collect();
        assert_eq!(got, ids.iter().map(String::as_str).collect::<Vec<_>>());
        assert_eq!(updates[1].kind, ChangeType::Create);
        assert_eq!(updates[1].data.as_ref().unwrap().id, "1");
    }

    #[test]
    fn missing_record_fails_whole_materialization() {
        let store = records(&["1", "2", "4"]);
        let deltas = vec![create("1"), create("2"), create("3"), create("4")];

        let err = materialize(&deltas, 2, |id| Ok(store.get(id).cloned())).unwrap_err();
        assert!(matches!(
            err,
            CoreError::LedgerInconsistency { ref record_id, .. } if record_id == "3"
        ));
        assert!(!err.is_retryable());
    }

    #[test]
    fn fetch_error_propagates() {
        let deltas = vec![create("1"), create("2")];
        let err = materialize(&deltas, 1, |_| {
            Err(StorageError::unavailable("store offline").into())
        })
        .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn apply_stops_at_first_failure() {
        let store = records(&["1", "2", "3"]);
        let deltas = vec![create("1"), create("2"), create("3")];
        let updates = materialize(&deltas, 1, |id| Ok(store.get(id).cloned())).unwrap();

        let mut applied = Vec::new();
        let err = apply_updates(&updates, |update| {
            if update.record_id() == "2" {
                return Err(StorageError::unavailable("disk full").into());
            }
            applied.push(update.record_id().to_string());
            Ok(())
        })
        .unwrap_err();

        assert_eq!(applied, ["1"]);
        match err {
            CoreError::BulkApply { index, applied, .. } => {
                assert_eq!(index, 1);
                assert_eq!(applied, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn apply_all_returns_count() {
        let updates = vec![Update::delete(delete("1")), Update::delete(delete("2"))];
        assert_eq!(apply_updates(&updates, |_| Ok(())).unwrap(), 2);
    }
}
