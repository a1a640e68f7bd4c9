//! Conflict reports and the conflict feed.
//!
//! Conflicts are never resolved here. A round returns them to its caller
//! and, when enabled, publishes them on a [`ConflictFeed`] for monitoring.
//!
//! ```rust
//! use relica_sync_engine::ConflictFeed;
//!
//! let feed = ConflictFeed::new();
//! let events = feed.subscribe();
//! assert_eq!(feed.subscriber_count(), 1);
//! drop(events);
//! ```

use parking_lot::RwLock;
use relica_core::{ChangeRecord, ConflictPair};
use serde::Serialize;
use std::sync::mpsc::{self, Receiver, Sender};

/// A record changed independently on both replicas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictReport {
    /// Id of the conflicting record.
    pub record_id: String,
    /// Name of the source replica.
    pub source: String,
    /// Name of the target replica.
    pub target: String,
    /// The source's change for the record.
    pub source_change: ChangeRecord,
    /// The target's ledger entry for the record.
    pub target_change: ChangeRecord,
}

impl ConflictReport {
    /// Builds a report from a pair found by the target's diff.
    ///
    /// In that diff the offered (source) change plays the local role.
    pub fn from_pair(pair: ConflictPair, source: &str, target: &str) -> Self {
        Self {
            record_id: pair.local.record_id.clone(),
            source: source.to_string(),
            target: target.to_string(),
            source_change: pair.local,
            target_change: pair.remote,
        }
    }
}

/// Conflicts published after a successful round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictEvent {
    /// Name of the source replica.
    pub source: String,
    /// Name of the target replica.
    pub target: String,
    /// Source checkpoint allocated at the end of the round.
    pub checkpoint: i64,
    /// The conflicts, never empty.
    pub conflicts: Vec<ConflictReport>,
}

/// Distributes conflict events to subscribers.
///
/// Disconnected subscribers are dropped on the next emit.
#[derive(Debug, Default)]
pub struct ConflictFeed {
    subscribers: RwLock<Vec<Sender<ConflictEvent>>>,
}

impl ConflictFeed {
    /// Creates a feed with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to future conflict events.
    pub fn subscribe(&self) -> Receiver<ConflictEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Sends an event to every live subscriber.
    pub fn emit(&self, event: ConflictEvent) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Returns the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}
