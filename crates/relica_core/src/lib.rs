//! # Relica Core
//!
//! Change tracking and replication primitives for Relica.
//!
//! This crate provides:
//! - Checkpoint sequencing per source
//! - A change ledger with one entry per tracked record
//! - Rectification after every write, plus a maintenance sweep
//! - Diffing of change sets into deltas and conflicts
//! - Materialization of deltas into updates and their (non-atomic) application
//!
//! [`TrackedModel`] ties all of these to one model in one
//! [`RecordStore`](relica_storage::RecordStore). There is no global registry:
//! every operation goes through an explicit `TrackedModel` value.
//!
//! ## Key Invariants
//!
//! - At most one change record per `(model, record id)`
//! - Checkpoint ids per source are contiguous and never reused
//! - Rectifying an unchanged record never produces a new delta
//! - Diffing is a pure read

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod checkpoint;
mod config;
mod diff;
mod error;
mod ledger;
mod model;
mod update;

pub use change::{change_id, revision, ChangeRecord, ChangeType};
pub use checkpoint::{Checkpoint, CheckpointSequencer, CHECKPOINT_MODEL, NO_CHECKPOINT};
pub use config::TrackingConfig;
pub use diff::{classify, diff_changes, Classification, ConflictPair, DiffResult};
pub use error::{CoreError, CoreResult};
pub use ledger::ChangeLedger;
pub use model::{SweepReport, TrackedModel};
pub use update::{apply_updates, materialize, Update};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
