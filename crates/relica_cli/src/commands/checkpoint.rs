//! Checkpoint command implementation.

use super::{CommandResult, StoreArgs};
use relica_core::NO_CHECKPOINT;

/// Shows the current checkpoint, or allocates the next one.
pub fn run(store: &StoreArgs, advance: bool) -> CommandResult<()> {
    let model = store.open_model()?;

    if advance {
        let checkpoint = model.checkpoint()?;
        println!("✓ Checkpoint {} allocated for {}", checkpoint.seq, checkpoint.source_id);
        return Ok(());
    }

    match model.current_checkpoint()? {
        NO_CHECKPOINT => println!("No checkpoint yet for {}", model.source_id()),
        seq => println!("Current checkpoint for {}: {}", model.source_id(), seq),
    }
    Ok(())
}
