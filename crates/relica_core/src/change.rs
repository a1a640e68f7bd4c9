//! Change records.

use relica_storage::Record;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Kind of change a ledger entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    /// The record exists and was never seen before.
    Create,
    /// The record exists and replaced an earlier revision.
    Update,
    /// The record no longer exists.
    Delete,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChangeType::Create => "create",
            ChangeType::Update => "update",
            ChangeType::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Returns the ledger key for a tracked record.
///
/// The key is a pure function of the pair, so upserting by key keeps at most
/// one entry per record.
pub fn change_id(model_name: &str, record_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model_name.as_bytes());
    hasher.update(b"-");
    hasher.update(record_id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Returns the content fingerprint of a record.
///
/// The record is hashed in its JSON object form with sorted keys, so the
/// same payload always yields the same revision on every replica.
pub fn revision(record: &Record) -> String {
    let canonical = record.to_value().to_string();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// The ledger entry for one tracked record.
///
/// `rev` is the fingerprint of the record when it was last rectified, or
/// `None` once the record is gone. `prev` is the fingerprint seen at the
/// rectification before that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Ledger key, see [`change_id`].
    pub id: String,
    /// Name of the tracked model.
    pub model_name: String,
    /// Id of the tracked record.
    pub record_id: String,
    /// Current revision, `None` if the record was deleted.
    pub rev: Option<String>,
    /// Revision observed at the previous rectification.
    pub prev: Option<String>,
    /// Checkpoint at which the entry was last rectified.
    pub checkpoint: i64,
}

impl ChangeRecord {
    /// Creates an entry with no revisions for the given record.
    pub fn new(model_name: impl Into<String>, record_id: impl Into<String>) -> Self {
        let model_name = model_name.into();
        let record_id = record_id.into();
        Self {
            id: change_id(&model_name, &record_id),
            model_name,
            record_id,
            rev: None,
            prev: None,
            checkpoint: crate::checkpoint::NO_CHECKPOINT,
        }
    }

    /// Sets the revisions, returning the entry.
    #[must_use]
    pub fn with_revisions(mut self, rev: Option<&str>, prev: Option<&str>) -> Self {
        self.rev = rev.map(str::to_string);
        self.prev = prev.map(str::to_string);
        self
    }

    /// Sets the checkpoint, returning the entry.
    #[must_use]
    pub fn at_checkpoint(mut self, checkpoint: i64) -> Self {
        self.checkpoint = checkpoint;
        self
    }

    /// Derives the kind of change.
    pub fn change_type(&self) -> ChangeType {
        match (&self.rev, &self.prev) {
            (None, _) => ChangeType::Delete,
            (Some(_), None) => ChangeType::Create,
            (Some(_), Some(_)) => ChangeType::Update,
        }
    }

    /// Returns true if both entries describe the same current state.
    pub fn equals(&self, other: &ChangeRecord) -> bool {
        self.rev == other.rev
    }

    /// Returns true if this change was made on top of `other`'s state.
    pub fn is_based_on(&self, other: &ChangeRecord) -> bool {
        match (&self.prev, &other.rev) {
            (Some(prev), Some(rev)) => prev == rev,
            // A fresh create on top of a deletion
            (None, None) => other.prev.is_some(),
            _ => false,
        }
    }

    /// Returns true if both sides changed independently.
    pub fn conflicts_with(&self, other: &ChangeRecord) -> bool {
        if self.equals(other) {
            return false;
        }
        if self.change_type() == ChangeType::Delete && other.change_type() == ChangeType::Delete {
            return false;
        }
        !self.is_based_on(other) && !other.is_based_on(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_id_is_stable_per_pair() {
        assert_eq!(change_id("todo", "1"), change_id("todo", "1"));
        assert_ne!(change_id("todo", "1"), change_id("todo", "2"));
        assert_ne!(change_id("todo", "1"), change_id("note", "1"));
        assert_eq!(change_id("todo", "1").len(), 64);
    }

    #[test]
    fn revision_ignores_field_order() {
        let a = Record::new("1").with_field("x", 1).with_field("y", 2);
        let b = Record::new("1").with_field("y", 2).with_field("x", 1);
        assert_eq!(revision(&a), revision(&b));
    }

    #[test]
    fn revision_tracks_content() {
        let a = Record::new("1").with_field("x", 1);
        let b = Record::new("1").with_field("x", 2);
        let c = Record::new("2").with_field("x", 1);
        assert_ne!(revision(&a), revision(&b));
        assert_ne!(revision(&a), revision(&c));
    }

    #[test]
    fn change_type_derivation() {
        let create = ChangeRecord::new("todo", "1").with_revisions(Some("r1"), None);
        assert_eq!(create.change_type(), ChangeType::Create);

        let update = ChangeRecord::new("todo", "1").with_revisions(Some("r2"), Some("r1"));
        assert_eq!(update.change_type(), ChangeType::Update);

        let delete = ChangeRecord::new("todo", "1").with_revisions(None, Some("r2"));
        assert_eq!(delete.change_type(), ChangeType::Delete);
    }

    #[test]
    fn based_on_and_conflicts() {
        let base = ChangeRecord::new("todo", "5").with_revisions(Some("r1"), None);
        let ours = ChangeRecord::new("todo", "5").with_revisions(Some("r2"), Some("r1"));
        let theirs = ChangeRecord::new("todo", "5").with_revisions(Some("r3"), Some("r1"));

        assert!(ours.is_based_on(&base));
        assert!(!base.is_based_on(&ours));
        assert!(!ours.conflicts_with(&base));
        assert!(ours.conflicts_with(&theirs));
        assert!(theirs.conflicts_with(&ours));
        assert!(!ours.conflicts_with(&ours.clone()));
    }

    #[test]
    fn recreate_after_delete_is_based_on_the_delete() {
        let deleted = ChangeRecord::new("todo", "5").with_revisions(None, Some("r1"));
        let recreated = ChangeRecord::new("todo", "5").with_revisions(Some("r9"), None);
        assert!(recreated.is_based_on(&deleted));
        assert!(!recreated.conflicts_with(&deleted));
    }

    #[test]
    fn both_deleted_never_conflict() {
        let a = ChangeRecord::new("todo", "5").with_revisions(None, Some("r1"));
        let b = ChangeRecord::new("todo", "5").with_revisions(None, Some("r2"));
        assert!(!a.conflicts_with(&b));
    }

    #[test]
    fn change_type_display() {
        assert_eq!(ChangeType::Create.to_string(), "create");
        assert_eq!(ChangeType::Delete.to_string(), "delete");
    }
}
