//! Changes command implementation.

use super::{CommandResult, StoreArgs};

/// Prints changes with `checkpoint > since`.
pub fn run(store: &StoreArgs, since: i64, format: &str) -> CommandResult<()> {
    let model = store.open_model()?;
    let changes = model.changes_since(since, None)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&changes)?);
        return Ok(());
    }

    println!("Changes in {} since {}:", model.source_id(), since);
    for change in &changes {
        println!(
            "  [{:>4}] {:<6} {}  rev={}",
            change.checkpoint,
            change.change_type(),
            change.record_id,
            change.rev.as_deref().map_or("-", |rev| &rev[..rev.len().min(12)])
        );
    }
    println!("({} changes)", changes.len());
    Ok(())
}
