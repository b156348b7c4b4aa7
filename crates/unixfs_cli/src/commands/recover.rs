//! Recover command implementation.

use super::open_existing;
use std::path::Path;

/// Runs recovery and prints the report.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let driver = open_existing(path)?;
    let before = driver.max_applied_sequence();
    let report = driver.recover()?;

    println!("Recovery of {:?}", path);
    println!("  Reclaimed: {}", report.reclaimed);
    println!("  Applied:   {}", report.applied);
    println!("  Aborted:   {}", report.aborted);
    if let Some(at) = report.truncated_at {
        println!("  Truncated at {} ({} entries lost)", at, report.skipped);
    }
    println!(
        "  Max applied: {} -> {}",
        before,
        driver.max_applied_sequence()
    );
    Ok(())
}
