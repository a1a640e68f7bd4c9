//! # Relica Storage
//!
//! Record store trait and implementations for Relica.
//!
//! This crate is the persistence collaborator of the replication engine.
//! Stores hold JSON-like records grouped by model name and answer simple
//! predicate queries. They know nothing about change tracking: change
//! records and checkpoints are persisted through the same interface as any
//! other model.
//!
//! ## Design Principles
//!
//! - Records are addressed by `(model, id)`
//! - `save` is an upsert, `destroy` of an absent id is not an error
//! - Must be `Send + Sync` for shared access
//! - Each store reports a stable connector name used to derive source ids
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral replicas
//! - [`FileStore`] - Append-only log on disk, replayed on open
//!
//! ## Example
//!
//! ```rust
//! use relica_storage::{Filter, InMemoryStore, Record, RecordStore};
//!
//! let store = InMemoryStore::new();
//! store.save("todo", Record::new("1").with_field("title", "milk")).unwrap();
//!
//! let found = store.find("todo", &Filter::new().where_eq("title", "milk")).unwrap();
//! assert_eq!(found.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod filter;
mod memory;
mod record;
mod store;

pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use filter::{Condition, Filter};
pub use memory::InMemoryStore;
pub use record::{Record, ID_FIELD};
pub use store::RecordStore;
