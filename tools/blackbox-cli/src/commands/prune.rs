//! One-off retention pass over a directory.

use std::path::PathBuf;

use anyhow::Context;
use blackbox_capture_engine::retention::{enforce_with_order, RetentionOrder};

pub fn run(dir: PathBuf, keep: usize, by_name: bool) -> anyhow::Result<()> {
    anyhow::ensure!(keep > 0, "--keep must be at least 1");

    let order = if by_name {
        RetentionOrder::Name
    } else {
        RetentionOrder::Modified
    };
    let removed = enforce_with_order(&dir, keep, order)
        .with_context(|| format!("Failed to prune {}", dir.display()))?;

    if removed.is_empty() {
        println!("Nothing to delete in {} (keeping {keep}).", dir.display());
    } else {
        for name in &removed {
            println!("Deleted: {name}");
        }
        println!("Removed {} file(s) from {}.", removed.len(), dir.display());
    }
    Ok(())
}
