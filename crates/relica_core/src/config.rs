//! Change tracking configuration.

/// Configuration for a [`TrackedModel`](crate::TrackedModel).
#[derive(Debug, Clone)]
pub struct TrackingConfig {
    /// Maximum number of concurrent record fetches while materializing updates.
    pub materialize_fanout: usize,
    /// Whether `create` rejects ids that already exist.
    pub reject_duplicate_creates: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            materialize_fanout: 8,
            reject_duplicate_creates: true,
        }
    }
}

impl TrackingConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the materialization fan-out. Values below 1 are treated as 1.
    #[must_use]
    pub const fn materialize_fanout(mut self, fanout: usize) -> Self {
        self.materialize_fanout = fanout;
        self
    }

    /// Sets whether `create` rejects existing ids.
    #[must_use]
    pub const fn reject_duplicate_creates(mut self, value: bool) -> Self {
        self.reject_duplicate_creates = value;
        self
    }
}
