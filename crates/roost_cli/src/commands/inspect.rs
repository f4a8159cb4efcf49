//! Inspect command implementation.

use roost_storage::Database;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// File size in bytes.
    pub file_size: u64,
    /// Total records across all entities.
    pub record_count: u64,
    /// Records per entity.
    pub entities: Vec<EntityStats>,
}

/// Record count for a single entity.
#[derive(Debug, Serialize)]
pub struct EntityStats {
    /// Entity name.
    pub name: &'static str,
    /// Number of records.
    pub count: u64,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No store found at {:?}", path).into());
    }

    let file_size = fs::metadata(path)?.len();
    let db = Database::open(path)?;
    let counts = roost_model::check::stats(&db)?;

    let result = InspectResult {
        path: path.display().to_string(),
        file_size,
        record_count: counts.iter().map(|(_, count)| count).sum(),
        entities: counts
            .into_iter()
            .map(|(name, count)| EntityStats { name, count })
            .collect(),
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text(&result),
    }

    Ok(())
}

fn print_text(result: &InspectResult) {
    println!("Store: {}", result.path);
    println!("  Size:    {} bytes", result.file_size);
    println!("  Records: {}", result.record_count);
    println!();
    println!("  {:<14} {:>8}", "Entity", "Count");
    for entity in &result.entities {
        println!("  {:<14} {:>8}", entity.name, entity.count);
    }
}
