//! Fault injection.
//!
//! [`FlakyStore`] wraps any [`RecordStore`] and fails selected operations
//! with [`StorageError::Unavailable`], the transient error a real backend
//! reports when it is briefly unreachable.

use parking_lot::Mutex;
use relica_storage::{Filter, Record, RecordStore, StorageError, StorageResult};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
struct Faults {
    /// Saves still allowed per model before failing.
    save_budget: HashMap<String, usize>,
    reads: HashSet<String>,
    destroys: HashSet<String>,
}

/// A store wrapper that fails chosen operations on chosen models.
#[derive(Debug)]
pub struct FlakyStore<S> {
    inner: S,
    faults: Mutex<Faults>,
    injected: AtomicUsize,
}

impl<S: RecordStore> FlakyStore<S> {
    /// Wraps `inner` with no faults armed.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            faults: Mutex::new(Faults::default()),
            injected: AtomicUsize::new(0),
        }
    }

    /// Returns the wrapped store, bypassing fault injection.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Fails every save on `model`.
    pub fn fail_saves_on(&self, model: &str) {
        self.fail_saves_after(model, 0);
    }

    /// Lets `allowed` more saves on `model` succeed, then fails the rest.
    pub fn fail_saves_after(&self, model: &str, allowed: usize) {
        self.faults.lock().save_budget.insert(model.to_string(), allowed);
    }

    /// Fails every `find` and `find_by_id` on `model`.
    pub fn fail_reads_on(&self, model: &str) {
        self.faults.lock().reads.insert(model.to_string());
    }

    /// Fails every destroy on `model`.
    pub fn fail_destroys_on(&self, model: &str) {
        self.faults.lock().destroys.insert(model.to_string());
    }

    /// Disarms every fault.
    pub fn heal(&self) {
        *self.faults.lock() = Faults::default();
    }

    /// Returns how many operations were failed so far.
    pub fn injected_failures(&self) -> usize {
        self.injected.load(Ordering::SeqCst)
    }

    fn injected(&self, op: &str, model: &str) -> StorageError {
        self.injected.fetch_add(1, Ordering::SeqCst);
        StorageError::unavailable(format!("injected {op} failure on {model}"))
    }

    fn check_read(&self, model: &str) -> StorageResult<()> {
        if self.faults.lock().reads.contains(model) {
            return Err(self.injected("read", model));
        }
        Ok(())
    }
}

impl<S: RecordStore> RecordStore for FlakyStore<S> {
    fn connector_name(&self) -> &str {
        self.inner.connector_name()
    }

    fn find(&self, model: &str, filter: &Filter) -> StorageResult<Vec<Record>> {
        self.check_read(model)?;
        self.inner.find(model, filter)
    }

    fn find_by_id(&self, model: &str, id: &str) -> StorageResult<Option<Record>> {
        self.check_read(model)?;
        self.inner.find_by_id(model, id)
    }

    fn save(&self, model: &str, record: Record) -> StorageResult<Record> {
        {
            let mut faults = self.faults.lock();
            if let Some(budget) = faults.save_budget.get_mut(model) {
                if *budget == 0 {
                    drop(faults);
                    return Err(self.injected("save", model));
                }
                *budget -= 1;
            }
        }
        self.inner.save(model, record)
    }

    fn destroy(&self, model: &str, id: &str) -> StorageResult<bool> {
        if self.faults.lock().destroys.contains(model) {
            return Err(self.injected("destroy", model));
        }
        self.inner.destroy(model, id)
    }
}
