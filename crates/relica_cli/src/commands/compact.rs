//! Compact command implementation.

use super::{CommandResult, StoreArgs};

/// Rewrites the store log to live records only.
pub fn run(store: &StoreArgs) -> CommandResult<()> {
    let before = std::fs::metadata(&store.path).map(|m| m.len()).unwrap_or(0);
    let file_store = store.open_store()?;
    file_store.compact()?;
    let after = std::fs::metadata(&store.path).map(|m| m.len()).unwrap_or(0);

    println!("Compacted {:?}", store.path);
    println!("  Size before: {before} bytes");
    println!("  Size after:  {after} bytes");
    Ok(())
}
