//! Diffing of change sets.
//!
//! A diff compares candidate changes against a peer's ledger entries for the
//! same records and sorts every candidate into exactly one bucket: a delta
//! the peer should receive, a conflict, or already in sync. Diffing never
//! writes.

use crate::change::{ChangeRecord, ChangeType};
use serde::Serialize;
use std::collections::HashMap;

/// Outcome of comparing one change against the peer's entry for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The peer is missing this change.
    Delta,
    /// Both sides changed the record independently.
    Conflict,
    /// The peer already has this state, or a state built on it.
    InSync,
}

/// Classifies a candidate change against the peer's entry for the same record.
pub fn classify(local: &ChangeRecord, remote: Option<&ChangeRecord>) -> Classification {
    let Some(remote) = remote else {
        return Classification::Delta;
    };

    if local.change_type() == ChangeType::Delete {
        if remote.change_type() == ChangeType::Delete || local.equals(remote) {
            return Classification::InSync;
        }
        return Classification::Delta;
    }

    if local.equals(remote) || remote.is_based_on(local) {
        Classification::InSync
    } else if local.is_based_on(remote) {
        Classification::Delta
    } else {
        Classification::Conflict
    }
}

/// A pair of changes to the same record made independently on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictPair {
    /// The candidate change.
    pub local: ChangeRecord,
    /// The peer's entry for the same record.
    pub remote: ChangeRecord,
}

impl ConflictPair {
    /// Returns the id of the conflicting record.
    pub fn record_id(&self) -> &str {
        &self.local.record_id
    }
}

/// Deltas and conflicts produced by a diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffResult {
    /// Changes the peer should receive, in candidate order.
    pub deltas: Vec<ChangeRecord>,
    /// Records changed on both sides.
    pub conflicts: Vec<ConflictPair>,
}

impl DiffResult {
    /// Returns true if there is nothing to send and nothing in conflict.
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty() && self.conflicts.is_empty()
    }
}

/// Diffs candidate changes against the peer's entries.
///
/// Only candidates with `checkpoint > since` are considered. `remote` is
/// matched to candidates by record id; entries with no matching candidate
/// are ignored.
pub fn diff_changes<'a, I>(since: i64, local: I, remote: &[ChangeRecord]) -> DiffResult
where
    I: IntoIterator<Item = &'a ChangeRecord>,
{
    let by_record: HashMap<&str, &ChangeRecord> = remote
        .iter()
        .map(|change| (change.record_id.as_str(), change))
        .collect();

    let mut result = DiffResult::default();
    for change in local.into_iter().filter(|c| c.checkpoint > since) {
        let peer = by_record.get(change.record_id.as_str()).copied();
        match classify(change, peer) {
            Classification::Delta => result.deltas.push(change.clone()),
            Classification::Conflict => result.conflicts.push(ConflictPair {
                local: change.clone(),
                // classify only reports conflicts when the peer has an entry
                remote: peer.cloned().unwrap_or_else(|| change.clone()),
            }),
            Classification::InSync => {}
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn change(id: &str, rev: Option<&str>, prev: Option<&str>, cp: i64) -> ChangeRecord {
        ChangeRecord::new("todo", id)
            .with_revisions(rev, prev)
            .at_checkpoint(cp)
    }

    #[test]
    fn missing_remote_is_delta() {
        let local = change("1", Some("a"), None, 0);
        assert_eq!(classify(&local, None), Classification::Delta);
    }

    #[test]
    fn equal_revisions_are_in_sync() {
        let local = change("1", Some("b"), Some("a"), 0);
        let remote = change("1", Some("b"), Some("a"), 4);
        assert_eq!(classify(&local, Some(&remote)), Classification::InSync);
    }

    #[test]
    fn remote_ahead_is_in_sync() {
        let local = change("1", Some("b"), Some("a"), 0);
        let remote = change("1", Some("c"), Some("b"), 0);
        assert_eq!(classify(&local, Some(&remote)), Classification::InSync);
    }

    #[test]
    fn local_ahead_is_delta() {
        let local = change("1", Some("c"), Some("b"), 0);
        let remote = change("1", Some("b"), Some("a"), 0);
        assert_eq!(classify(&local, Some(&remote)), Classification::Delta);
    }

    #[test]
    fn diverged_is_conflict() {
        let local = change("5", Some("b"), Some("a"), 0);
        let remote = change("5", Some("c"), Some("a"), 0);
        assert_eq!(classify(&local, Some(&remote)), Classification::Conflict);
    }

    #[test]
    fn delete_against_live_remote_is_delta() {
        let local = change("7", None, Some("a"), 0);
        let remote = change("7", Some("a"), None, 0);
        assert_eq!(classify(&local, Some(&remote)), Classification::Delta);

        let remote_edited = change("7", Some("z"), Some("a"), 0);
        assert_eq!(
            classify(&local, Some(&remote_edited)),
            Classification::Delta
        );
    }

    #[test]
    fn delete_against_delete_is_in_sync() {
        let local = change("7", None, Some("a"), 0);
        let remote = change("7", None, Some("b"), 0);
        assert_eq!(classify(&local, Some(&remote)), Classification::InSync);
    }

    #[test]
    fn diff_sorts_into_buckets() {
        let local = vec![
            change("1", Some("a"), None, 1),
            change("5", Some("b"), Some("a"), 1),
            change("7", None, Some("a"), 1),
            change("9", Some("x"), None, 1),
        ];
        let remote = vec![
            change("5", Some("c"), Some("a"), 0),
            change("7", Some("a"), None, 0),
            change("9", Some("x"), None, 0),
        ];

        let result = diff_changes(0, &local, &remote);
        let delta_ids: Vec<_> = result.deltas.iter().map(|c| c.record_id.as_str()).collect();
        assert_eq!(delta_ids, ["1", "7"]);
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].record_id(), "5");
        assert_eq!(result.conflicts[0].remote.rev.as_deref(), Some("c"));
    }

    #[test]
    fn diff_respects_since() {
        let local = vec![change("1", Some("a"), None, 2), change("2", Some("b"), None, 3)];
        let result = diff_changes(2, &local, &[]);
        assert_eq!(result.deltas.len(), 1);
        assert_eq!(result.deltas[0].record_id, "2");
        assert!(diff_changes(3, &local, &[]).is_empty());
    }

    fn arb_change() -> impl Strategy<Value = ChangeRecord> {
        (
            "[a-z0-9]{1,6}",
            proptest::option::of("[a-f]{4}"),
            proptest::option::of("[a-f]{4}"),
            -1i64..20,
        )
            .prop_map(|(id, rev, prev, cp)| {
                change(&id, rev.as_deref(), prev.as_deref(), cp)
            })
    }

    proptest! {
        #[test]
        fn empty_remote_yields_every_candidate_as_delta(
            changes in proptest::collection::vec(arb_change(), 0..32),
            since in -1i64..20,
        ) {
            let result = diff_changes(since, &changes, &[]);
            let expected: Vec<_> = changes.iter().filter(|c| c.checkpoint > since).cloned().collect();
            prop_assert_eq!(result.deltas, expected);
            prop_assert!(result.conflicts.is_empty());
        }

        #[test]
        fn every_candidate_lands_in_at_most_one_bucket(
            local in proptest::collection::vec(arb_change(), 0..16),
            remote in proptest::collection::vec(arb_change(), 0..16),
        ) {
            let result = diff_changes(-1, &local, &remote);
            prop_assert!(result.deltas.len() + result.conflicts.len() <= local.len());
        }
    }
}
