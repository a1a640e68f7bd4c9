//! # Relica Sync Engine
//!
//! Replication coordinator and maintenance for Relica.
//!
//! This crate provides:
//! - The [`Replica`] seam and an in-process [`LocalReplica`]
//! - The [`Replicator`], running checkpoint-delimited replication rounds
//! - Conflict reports and a subscribable [`ConflictFeed`]
//! - A tokio-driven [`MaintenanceScheduler`] for ledger sweeps
//!
//! ## Architecture
//!
//! A round pushes the source's pending changes to one target:
//! 1. Load the source's changes since the last replicated checkpoint
//! 2. Let the target diff them against its own ledger
//! 3. Materialize updates for the deltas on the source
//! 4. Apply them on the target, one at a time
//! 5. Advance the source checkpoint
//!
//! Replicating in both directions is two rounds with the roles swapped.
//!
//! ## Key Invariants
//!
//! - Steps run strictly in order; the first failure ends the round
//! - The source checkpoint only advances when every step succeeded
//! - Applying updates is not atomic, but replaying a round is safe
//! - Conflicts are reported, never resolved
//!
//! ## Example
//!
//! ```rust
//! use relica_core::TrackedModel;
//! use relica_storage::{InMemoryStore, Record};
//! use relica_sync_engine::{LocalReplica, ReplicateOptions, Replicator};
//! use std::sync::Arc;
//!
//! let client = Arc::new(LocalReplica::new(Arc::new(TrackedModel::new(
//!     Arc::new(InMemoryStore::with_connector_name("client")),
//!     "todo",
//! ))));
//! let server = LocalReplica::new(Arc::new(TrackedModel::new(
//!     Arc::new(InMemoryStore::with_connector_name("server")),
//!     "todo",
//! )));
//!
//! client.model().create(Record::new("1").with_field("title", "milk")).unwrap();
//!
//! let replicator = Replicator::new(client.clone());
//! let outcome = replicator.replicate(-1, &server, &ReplicateOptions::new()).unwrap();
//! assert_eq!(outcome.deltas_applied, 1);
//! assert!(outcome.conflicts.is_empty());
//! assert!(server.model().find_by_id("1").unwrap().is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod conflict;
mod error;
mod maintenance;
mod replica;
mod replicator;

pub use config::{ReplicateOptions, ReplicationConfig, DEFAULT_MAINTENANCE_INTERVAL};
pub use conflict::{ConflictEvent, ConflictFeed, ConflictReport};
pub use error::{SyncError, SyncResult};
pub use maintenance::MaintenanceScheduler;
pub use replica::{LocalReplica, Replica};
pub use replicator::{
    CancelHandle, ReplicationOutcome, ReplicationState, ReplicationStats, ReplicationStep,
    Replicator,
};
