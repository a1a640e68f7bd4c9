//! Rectify command implementation.

use super::{CommandResult, StoreArgs};

/// Runs one maintenance sweep.
pub fn run(store: &StoreArgs) -> CommandResult<()> {
    let model = store.open_model()?;
    let report = model.rectify_all()?;

    println!("Rectify sweep of {}:", model.source_id());
    println!("  Examined:  {}", report.examined);
    println!("  Rectified: {}", report.rectified);
    println!("  Failed:    {}", report.failed);

    if report.failed > 0 {
        return Err(format!("{} records could not be rectified", report.failed).into());
    }
    Ok(())
}
