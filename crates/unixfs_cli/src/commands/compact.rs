//! Compact command implementation.

use super::open_existing;
use std::path::Path;

/// Runs the compact command.
///
/// Recovery runs first so the rewritten log reflects every published entry.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let driver = open_existing(path)?;
    driver.recover()?;

    println!("Compacting DataStore at {:?}", path);
    println!();

    let stats = driver.compact()?;
    println!("  Live keys:          {}", stats.live_keys);
    println!("  Tombstones removed: {}", stats.tombstones_removed);
    println!();
    println!("  Size before: {} bytes", stats.bytes_before);
    println!("  Size after:  {} bytes", stats.bytes_after);
    println!(
        "  Space saved: {} bytes ({:.1}%)",
        stats.bytes_before.saturating_sub(stats.bytes_after),
        if stats.bytes_before > 0 {
            (stats.bytes_before.saturating_sub(stats.bytes_after) as f64
                / stats.bytes_before as f64)
                * 100.0
        } else {
            0.0
        }
    );
    Ok(())
}
