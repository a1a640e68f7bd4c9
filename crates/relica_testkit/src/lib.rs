//! # Relica Testkit
//!
//! Test utilities for Relica.
//!
//! This crate provides:
//! - A fault-injecting [`RecordStore`](relica_storage::RecordStore) wrapper
//! - Temporary file-backed stores
//! - Property-based test generators using proptest
//!
//! It depends only on `relica_storage`, so every other crate can use it as
//! a dev-dependency.
//!
//! ## Usage
//!
//! ```rust
//! use relica_storage::{InMemoryStore, Record, RecordStore};
//! use relica_testkit::FlakyStore;
//!
//! let store = FlakyStore::new(InMemoryStore::new());
//! store.fail_saves_on("todo");
//! assert!(store.save("todo", Record::new("1")).is_err());
//!
//! store.heal();
//! assert!(store.save("todo", Record::new("1")).is_ok());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
