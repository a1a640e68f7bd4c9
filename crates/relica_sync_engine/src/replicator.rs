//! The replication coordinator.
//!
//! A round moves the source's pending changes to a target as a strict
//! pipeline of fallible steps:
//!
//! 1. `changes_since` on the source
//! 2. `diff` on the target, from the target's point of view
//! 3. `create_updates` on the source, for the deltas only
//! 4. `bulk_update` on the target
//! 5. `checkpoint` on the source
//!
//! Steps 3 and 4 are skipped when there are no deltas. The first failing
//! step ends the round; the source checkpoint is only advanced when every
//! earlier step succeeded, so a failed round can be retried from the same
//! `since`.

use crate::config::{ReplicateOptions, ReplicationConfig};
use crate::conflict::{ConflictEvent, ConflictFeed, ConflictReport};
use crate::error::{SyncError, SyncResult};
use crate::replica::Replica;
use parking_lot::RwLock;
use relica_core::{Checkpoint, CoreError, NO_CHECKPOINT};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// A step of a replication round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplicationStep {
    /// Reading the source's pending changes.
    ChangesSince,
    /// Diffing on the target.
    Diff,
    /// Materializing updates on the source.
    CreateUpdates,
    /// Applying updates on the target.
    BulkUpdate,
    /// Advancing the source checkpoint.
    Checkpoint,
}

impl std::fmt::Display for ReplicationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ReplicationStep::ChangesSince => "changes_since",
            ReplicationStep::Diff => "diff",
            ReplicationStep::CreateUpdates => "create_updates",
            ReplicationStep::BulkUpdate => "bulk_update",
            ReplicationStep::Checkpoint => "checkpoint",
        };
        f.write_str(name)
    }
}

/// The state of a replicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationState {
    /// No round has run yet.
    Idle,
    /// A round is executing the given step.
    Running(ReplicationStep),
    /// The last round completed.
    Completed,
    /// The last round failed or was cancelled.
    Failed,
}

impl ReplicationState {
    /// Returns true if a round is running.
    pub fn is_active(&self) -> bool {
        matches!(self, ReplicationState::Running(_))
    }
}

/// Statistics about replication rounds.
#[derive(Debug, Clone, Default)]
pub struct ReplicationStats {
    /// Rounds that advanced the checkpoint.
    pub rounds_completed: u64,
    /// Rounds that failed or were cancelled.
    pub rounds_failed: u64,
    /// Changes offered to targets.
    pub changes_offered: u64,
    /// Updates applied on targets.
    pub deltas_applied: u64,
    /// Conflicts reported.
    pub conflicts_reported: u64,
    /// Source checkpoint allocated by the last completed round.
    pub last_checkpoint: Option<i64>,
    /// Epoch covered by the last completed round, whichever its target.
    pub last_replicated_through: Option<i64>,
    /// Time the last round finished.
    pub last_round_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of a completed round.
#[derive(Debug, Clone)]
pub struct ReplicationOutcome {
    /// Conflicts found by the target, for the caller to resolve.
    pub conflicts: Vec<ConflictReport>,
    /// Number of changes offered to the target.
    pub offered: usize,
    /// Number of updates applied on the target.
    pub deltas_applied: usize,
    /// The source checkpoint allocated at the end of the round.
    pub checkpoint: Checkpoint,
    /// Epoch closed by this round. Pass it as `since` to the next round.
    pub replicated_through: i64,
    /// Duration of the round.
    pub duration: Duration,
}

/// Cancels the current round of a [`Replicator`] from anywhere.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Requests cancellation of the round in flight. It stops before its
    /// next step.
    ///
    /// Every round clears the request when it starts, so calling this while
    /// no round is running has no effect on the next one.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Clears the in-progress flag when a round ends, however it ends.
struct RoundGuard<'a>(&'a AtomicBool);

impl Drop for RoundGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Replicates one source to any number of targets, one round at a time.
///
/// Each target has its own resume point, keyed by [`Replica::name`].
pub struct Replicator {
    source: Arc<dyn Replica>,
    config: ReplicationConfig,
    state: RwLock<ReplicationState>,
    stats: RwLock<ReplicationStats>,
    cursors: RwLock<HashMap<String, i64>>,
    feed: Arc<ConflictFeed>,
    running: AtomicBool,
    cancelled: Arc<AtomicBool>,
}

impl Replicator {
    /// Creates a replicator for `source` with default configuration.
    pub fn new(source: Arc<dyn Replica>) -> Self {
        Self::with_config(source, ReplicationConfig::default())
    }

    /// Creates a replicator with the given configuration.
    pub fn with_config(source: Arc<dyn Replica>, config: ReplicationConfig) -> Self {
        Self {
            source,
            config,
            state: RwLock::new(ReplicationState::Idle),
            stats: RwLock::new(ReplicationStats::default()),
            cursors: RwLock::new(HashMap::new()),
            feed: Arc::new(ConflictFeed::new()),
            running: AtomicBool::new(false),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Publishes conflicts on a shared feed instead of a private one.
    #[must_use]
    pub fn with_feed(mut self, feed: Arc<ConflictFeed>) -> Self {
        self.feed = feed;
        self
    }

    /// Returns the source replica.
    pub fn source(&self) -> &Arc<dyn Replica> {
        &self.source
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// Returns the conflict feed.
    pub fn feed(&self) -> &Arc<ConflictFeed> {
        &self.feed
    }

    /// Subscribes to conflict events.
    pub fn subscribe(&self) -> Receiver<ConflictEvent> {
        self.feed.subscribe()
    }

    /// Gets the current state.
    pub fn state(&self) -> ReplicationState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> ReplicationStats {
        self.stats.read().clone()
    }

    /// Returns a handle that cancels the running round.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancelled))
    }

    /// Returns the epoch the last completed round into `target` covered,
    /// or `None` if no round into it has completed.
    pub fn replicated_through(&self, target: &str) -> Option<i64> {
        self.cursors.read().get(target).copied()
    }

    /// Cancels the running round before its next step.
    ///
    /// Has no effect on a round that starts later; see [`CancelHandle::cancel`].
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Runs one round, offering the source's changes newer than `since`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Step`] naming the first failing step,
    /// [`SyncError::Cancelled`] if the round was cancelled before the
    /// checkpoint step, or [`SyncError::RoundInProgress`] if this replicator
    /// is already running a round. In every case the source checkpoint is
    /// left where it was. Updates applied before a `bulk_update` failure stay
    /// applied on the target.
    pub fn replicate(
        &self,
        since: i64,
        target: &dyn Replica,
        options: &ReplicateOptions,
    ) -> SyncResult<ReplicationOutcome> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::RoundInProgress {
                source_replica: self.source.name().to_string(),
            });
        }
        let _round = RoundGuard(&self.running);
        self.cancelled.store(false, Ordering::SeqCst);

        let start = Instant::now();
        match self.run_round(since, target, options, start) {
            Ok(outcome) => {
                self.record_success(target.name(), &outcome);
                info!(
                    source = self.source.name(),
                    target = target.name(),
                    since,
                    offered = outcome.offered,
                    applied = outcome.deltas_applied,
                    conflicts = outcome.conflicts.len(),
                    checkpoint = outcome.checkpoint.seq,
                    duration_ms = outcome.duration.as_millis() as u64,
                    "replication round completed"
                );
                Ok(outcome)
            }
            Err(e) => {
                self.record_failure(&e);
                error!(
                    source = self.source.name(),
                    target = target.name(),
                    since,
                    error = %e,
                    "replication round failed"
                );
                Err(e)
            }
        }
    }

    /// Runs a round starting where the last completed round into `target`
    /// left off, or from the beginning if none has completed.
    ///
    /// # Errors
    ///
    /// See [`replicate`](Self::replicate).
    pub fn replicate_pending(
        &self,
        target: &dyn Replica,
        options: &ReplicateOptions,
    ) -> SyncResult<ReplicationOutcome> {
        let since = self
            .replicated_through(target.name())
            .unwrap_or(NO_CHECKPOINT);
        self.replicate(since, target, options)
    }

    fn run_round(
        &self,
        since: i64,
        target: &dyn Replica,
        options: &ReplicateOptions,
        start: Instant,
    ) -> SyncResult<ReplicationOutcome> {
        let source = self.source.as_ref();
        let fail = move |step: ReplicationStep| {
            move |error: CoreError| SyncError::Step {
                step,
                source_replica: source.name().to_string(),
                target_replica: target.name().to_string(),
                error,
            }
        };

        self.enter(ReplicationStep::ChangesSince)?;
        let offered = source
            .changes_since(since, options.filter.as_ref())
            .map_err(fail(ReplicationStep::ChangesSince))?;
        debug!(source = source.name(), since, count = offered.len(), "changes loaded");

        self.enter(ReplicationStep::Diff)?;
        let diff = target
            .diff(since, &offered)
            .map_err(fail(ReplicationStep::Diff))?;
        debug!(
            target = target.name(),
            deltas = diff.deltas.len(),
            conflicts = diff.conflicts.len(),
            "diff computed"
        );

        let mut deltas_applied = 0;
        if !diff.deltas.is_empty() {
            self.enter(ReplicationStep::CreateUpdates)?;
            let updates = source
                .create_updates(&diff.deltas)
                .map_err(fail(ReplicationStep::CreateUpdates))?;

            self.enter(ReplicationStep::BulkUpdate)?;
            deltas_applied = target
                .bulk_update(&updates)
                .map_err(fail(ReplicationStep::BulkUpdate))?;
            debug!(target = target.name(), applied = deltas_applied, "updates applied");
        }

        self.enter(ReplicationStep::Checkpoint)?;
        let checkpoint = source
            .checkpoint()
            .map_err(fail(ReplicationStep::Checkpoint))?;

        let conflicts: Vec<ConflictReport> = diff
            .conflicts
            .into_iter()
            .map(|pair| ConflictReport::from_pair(pair, source.name(), target.name()))
            .collect();

        if !conflicts.is_empty() {
            for conflict in &conflicts {
                warn!(
                    source = source.name(),
                    target = target.name(),
                    record_id = %conflict.record_id,
                    "conflict detected"
                );
            }
            if self.config.emit_conflicts {
                self.feed.emit(ConflictEvent {
                    source: source.name().to_string(),
                    target: target.name().to_string(),
                    checkpoint: checkpoint.seq,
                    conflicts: conflicts.clone(),
                });
            }
        }

        Ok(ReplicationOutcome {
            conflicts,
            offered: offered.len(),
            deltas_applied,
            replicated_through: checkpoint.seq - 1,
            checkpoint,
            duration: start.elapsed(),
        })
    }

    /// Moves to the next step unless the round was cancelled.
    fn enter(&self, step: ReplicationStep) -> SyncResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(SyncError::Cancelled);
        }
        *self.state.write() = ReplicationState::Running(step);
        Ok(())
    }

    fn record_success(&self, target: &str, outcome: &ReplicationOutcome) {
        *self.state.write() = ReplicationState::Completed;
        self.cursors
            .write()
            .insert(target.to_string(), outcome.replicated_through);
        let mut stats = self.stats.write();
        stats.rounds_completed += 1;
        stats.changes_offered += outcome.offered as u64;
        stats.deltas_applied += outcome.deltas_applied as u64;
        stats.conflicts_reported += outcome.conflicts.len() as u64;
        stats.last_checkpoint = Some(outcome.checkpoint.seq);
        stats.last_replicated_through = Some(outcome.replicated_through);
        stats.last_round_time = Some(Instant::now());
        stats.last_error = None;
    }

    fn record_failure(&self, error: &SyncError) {
        *self.state.write() = ReplicationState::Failed;
        let mut stats = self.stats.write();
        stats.rounds_failed += 1;
        stats.last_round_time = Some(Instant::now());
        stats.last_error = Some(error.to_string());
    }
}

impl std::fmt::Debug for Replicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replicator")
            .field("source", &self.source.name())
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
