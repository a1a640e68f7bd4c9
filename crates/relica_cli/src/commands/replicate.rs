//! Replicate command implementation.

use super::{parse_conditions, CommandResult, StoreArgs};
use relica_core::NO_CHECKPOINT;
use relica_storage::{Record, RecordStore};
use relica_sync_engine::{LocalReplica, Replica, ReplicateOptions, ReplicationOutcome, Replicator};
use serde::Serialize;
use std::sync::Arc;

/// Model holding, in the source store, one resume point per target replica.
pub const CURSOR_MODEL: &str = "ReplicationCursor";

/// Returns where the last round from this store into `target` stopped.
pub fn stored_cursor(store: &dyn RecordStore, target: &str) -> CommandResult<Option<i64>> {
    Ok(store
        .find_by_id(CURSOR_MODEL, target)?
        .and_then(|record| record.field("replicated_through"))
        .and_then(|value| value.as_i64()))
}

fn save_cursor(store: &dyn RecordStore, target: &str, replicated_through: i64) -> CommandResult<()> {
    store.save(
        CURSOR_MODEL,
        Record::new(target).with_field("replicated_through", replicated_through),
    )?;
    Ok(())
}

/// Printable summary of a round.
#[derive(Debug, Serialize)]
pub struct ReplicateSummary {
    /// Source replica name.
    pub source: String,
    /// Target replica name.
    pub target: String,
    /// Checkpoint the changes were offered from.
    pub since: i64,
    /// Changes offered.
    pub offered: usize,
    /// Updates applied on the target.
    pub applied: usize,
    /// Source checkpoint allocated by the round.
    pub checkpoint: i64,
    /// Value to pass as `--since` next time.
    pub replicated_through: i64,
    /// Conflicting record ids.
    pub conflicts: Vec<String>,
}

impl ReplicateSummary {
    fn new(source: &str, target: &str, since: i64, outcome: &ReplicationOutcome) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            since,
            offered: outcome.offered,
            applied: outcome.deltas_applied,
            checkpoint: outcome.checkpoint.seq,
            replicated_through: outcome.replicated_through,
            conflicts: outcome
                .conflicts
                .iter()
                .map(|c| c.record_id.clone())
                .collect(),
        }
    }
}

/// Runs one round from `source` into `target`.
///
/// Without `since`, the round resumes from the `replicated_through` saved
/// by the last completed round into the same target. A target that was
/// never replicated to is offered every change.
pub fn run(
    source: &StoreArgs,
    target: &StoreArgs,
    since: Option<i64>,
    conditions: &[String],
    format: &str,
) -> CommandResult<()> {
    if source.path == target.path {
        return Err("Source and target must be different stores".into());
    }

    let source_model = Arc::new(source.open_model()?);
    let cursors = Arc::clone(source_model.store());
    let source_replica = Arc::new(LocalReplica::new(source_model));
    let target_replica = LocalReplica::new(Arc::new(target.open_model()?));

    let since = match since {
        Some(since) => since,
        None => stored_cursor(cursors.as_ref(), target_replica.name())?.unwrap_or(NO_CHECKPOINT),
    };
    let mut options = ReplicateOptions::new();
    if !conditions.is_empty() {
        options = options.with_filter(parse_conditions(conditions)?);
    }

    let replicator = Replicator::new(source_replica.clone());
    let outcome = replicator.replicate(since, &target_replica, &options)?;
    save_cursor(cursors.as_ref(), target_replica.name(), outcome.replicated_through)?;
    let summary = ReplicateSummary::new(
        source_replica.name(),
        target_replica.name(),
        since,
        &outcome,
    );

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Replicated {} -> {}:", summary.source, summary.target);
    println!("  Since:              {}", summary.since);
    println!("  Offered:            {}", summary.offered);
    println!("  Applied:            {}", summary.applied);
    println!("  Checkpoint:         {}", summary.checkpoint);
    println!("  Replicated through: {}", summary.replicated_through);
    if summary.conflicts.is_empty() {
        println!("✓ No conflicts");
    } else {
        println!("⚠ {} conflicts:", summary.conflicts.len());
        for id in &summary.conflicts {
            println!("  - {id}");
        }
    }
    Ok(())
}
