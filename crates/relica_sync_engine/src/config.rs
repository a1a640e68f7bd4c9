//! Configuration for the sync engine.

use relica_storage::Filter;
use std::time::Duration;

/// Default interval between maintenance sweeps.
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for a [`Replicator`](crate::Replicator) and its maintenance.
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// Interval between `rectify_all` sweeps.
    pub maintenance_interval: Duration,
    /// Whether rounds with conflicts publish them on the conflict feed.
    pub emit_conflicts: bool,
}

impl ReplicationConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maintenance interval.
    #[must_use]
    pub fn with_maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    /// Sets whether conflicts are published on the conflict feed.
    #[must_use]
    pub fn with_emit_conflicts(mut self, emit: bool) -> Self {
        self.emit_conflicts = emit;
        self
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            maintenance_interval: DEFAULT_MAINTENANCE_INTERVAL,
            emit_conflicts: true,
        }
    }
}

/// Per-round options for [`Replicator::replicate`](crate::Replicator::replicate).
#[derive(Debug, Clone, Default)]
pub struct ReplicateOptions {
    /// Restricts the offered changes to records in this view. Deletions
    /// are always offered.
    pub filter: Option<Filter>,
}

impl ReplicateOptions {
    /// Creates options with no filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }
}
