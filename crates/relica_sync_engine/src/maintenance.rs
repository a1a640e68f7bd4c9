//! Background maintenance.
//!
//! The scheduler runs [`TrackedModel::rectify_all`] for each registered
//! model at startup and then on a fixed interval, healing ledger entries
//! left stale by a crash between a write and its rectification. Sweeps run
//! on the blocking pool; their failures are logged and never stop the loop.

use crate::config::ReplicationConfig;
use parking_lot::RwLock;
use relica_core::{SweepReport, TrackedModel};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Periodic `rectify_all` runner.
pub struct MaintenanceScheduler {
    models: RwLock<Vec<Arc<TrackedModel>>>,
    interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    running: AtomicBool,
    sweeps: AtomicU64,
}

impl MaintenanceScheduler {
    /// Creates a scheduler sweeping every `interval`.
    pub fn new(interval: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            models: RwLock::new(Vec::new()),
            interval,
            shutdown_tx,
            running: AtomicBool::new(false),
            sweeps: AtomicU64::new(0),
        }
    }

    /// Creates a scheduler sweeping every `config.maintenance_interval`.
    pub fn from_config(config: &ReplicationConfig) -> Self {
        Self::new(config.maintenance_interval)
    }

    /// Adds a model to every future sweep.
    pub fn register(&self, model: Arc<TrackedModel>) {
        self.models.write().push(model);
    }

    /// Returns the sweep interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns the number of completed sweeps.
    pub fn sweeps(&self) -> u64 {
        self.sweeps.load(Ordering::SeqCst)
    }

    /// Returns true while the loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawns the loop on the current tokio runtime.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.run_loop().await })
    }

    /// Runs the loop until [`shutdown`](Self::shutdown) is called.
    ///
    /// The first sweep starts immediately.
    pub async fn run_loop(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("maintenance scheduler is already running");
            return;
        }

        let mut shutdown = self.shutdown_tx.subscribe();
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_ms = self.interval.as_millis() as u64, "maintenance scheduler started");

        while !*shutdown.borrow_and_update() {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep_now().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("maintenance scheduler stopped");
    }

    /// Sweeps every registered model once.
    ///
    /// Returns the reports of the models whose sweep could run.
    pub async fn sweep_now(&self) -> Vec<(String, SweepReport)> {
        let models = self.models.read().clone();
        let mut reports = Vec::with_capacity(models.len());

        for model in models {
            let name = model.model_name().to_string();
            let swept = tokio::task::spawn_blocking(move || model.rectify_all()).await;
            match swept {
                Ok(Ok(report)) => {
                    if report.rectified > 0 || report.failed > 0 {
                        info!(
                            model = %name,
                            rectified = report.rectified,
                            failed = report.failed,
                            "maintenance sweep healed ledger"
                        );
                    } else {
                        debug!(model = %name, examined = report.examined, "maintenance sweep clean");
                    }
                    reports.push((name, report));
                }
                Ok(Err(e)) => warn!(model = %name, error = %e, "maintenance sweep failed"),
                Err(e) => warn!(model = %name, error = %e, "maintenance sweep panicked"),
            }
        }

        self.sweeps.fetch_add(1, Ordering::SeqCst);
        reports
    }

    /// Signals the loop to stop after the current sweep.
    ///
    /// A scheduler that was shut down does not start again.
    pub fn shutdown(&self) {
        info!("signaling maintenance scheduler shutdown");
        self.shutdown_tx.send_replace(true);
    }
}

impl std::fmt::Debug for MaintenanceScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceScheduler")
            .field("models", &self.models.read().len())
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relica_storage::{InMemoryStore, Record, RecordStore};
    use relica_testkit::FlakyStore;

    #[tokio::test]
    async fn sweep_now_heals_missed_writes() {
        let store = Arc::new(InMemoryStore::new());
        let model = Arc::new(TrackedModel::new(store.clone(), "todo"));
        store.save("todo", Record::new("1")).unwrap();

        let scheduler = MaintenanceScheduler::from_config(&ReplicationConfig::default());
        assert_eq!(scheduler.interval(), Duration::from_secs(30));
        scheduler.register(Arc::clone(&model));

        let reports = scheduler.sweep_now().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].1.rectified, 1);
        assert_eq!(model.changes_since(-1, None).unwrap().len(), 1);
        assert_eq!(scheduler.sweeps(), 1);
    }

    #[tokio::test]
    async fn failing_sweep_is_not_fatal() {
        let store = Arc::new(FlakyStore::new(InMemoryStore::new()));
        let broken = Arc::new(TrackedModel::new(store.clone(), "todo"));
        store.fail_reads_on("todo-change");

        let healthy_store = Arc::new(InMemoryStore::new());
        healthy_store.save("note", Record::new("1")).unwrap();
        let healthy = Arc::new(TrackedModel::new(healthy_store, "note"));

        let scheduler = MaintenanceScheduler::new(Duration::from_secs(30));
        scheduler.register(broken);
        scheduler.register(healthy);

        let reports = scheduler.sweep_now().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, "note");
    }

    #[tokio::test]
    async fn loop_sweeps_at_startup_and_stops_on_shutdown() {
        let store = Arc::new(InMemoryStore::new());
        let model = Arc::new(TrackedModel::new(store.clone(), "todo"));
        store.save("todo", Record::new("1")).unwrap();

        let config = ReplicationConfig::new().with_maintenance_interval(Duration::from_millis(20));
        let scheduler = Arc::new(MaintenanceScheduler::from_config(&config));
        scheduler.register(Arc::clone(&model));
        let handle = scheduler.start();

        tokio::time::timeout(Duration::from_secs(2), async {
            while scheduler.sweeps() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("scheduler should sweep repeatedly");
        assert!(scheduler.is_running());
        assert_eq!(model.changes_since(-1, None).unwrap().len(), 1);

        scheduler.shutdown();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("scheduler should stop within timeout")
            .expect("scheduler task should complete without error");
        assert!(!scheduler.is_running());
    }
}
