//! Check command implementation.

use roost_model::check::{check, CheckReport};
use std::path::Path;

/// Runs the check command.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No store found at {:?}", path).into());
    }

    if dry_run {
        println!("Would check store at {:?}", path);
        println!("  - back the file up and re-encode every record");
        println!("  - remove records with dangling references");
        println!("  - merge feeds duplicating a URL");
        println!("  - rebuild all secondary indexes");
        return Ok(());
    }

    let report = check(path)?;
    print_report(&report);

    Ok(())
}

fn print_report(report: &CheckReport) {
    println!("Check complete");
    println!("  Records copied:          {}", report.records_copied);
    println!("  Records skipped:         {}", report.records_skipped);
    println!("  Subscriptions removed:   {}", report.subscriptions_removed);
    println!("  Feeds merged:            {}", report.feeds_merged);
    println!("  Feeds removed:           {}", report.feeds_removed);
    println!("  Groups removed:          {}", report.groups_removed);
    println!("  Group refs scrubbed:     {}", report.group_refs_scrubbed);
    println!("  Items removed:           {}", report.items_removed);
    println!("  Entries removed:         {}", report.entries_removed);
    println!("  Transmissions removed:   {}", report.transmissions_removed);
    println!("  Index entries rebuilt:   {}", report.index_entries);

    if report.warnings.is_empty() {
        println!("  No warnings");
    } else {
        println!("  Warnings:");
        for warning in &report.warnings {
            println!("    {warning}");
        }
    }
}
