//! Roost CLI
//!
//! Command-line maintenance tools for Roost stores.
//!
//! # Commands
//!
//! - `inspect` - Display record counts and store metadata
//! - `check` - Verify integrity, migrate records, rebuild indexes
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Roost command-line store tools.
#[derive(Parser)]
#[command(name = "roost")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display record counts and store metadata
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify integrity, migrate records, and rebuild indexes.
    /// The store must not be open anywhere else.
    Check {
        /// Report what would be checked without touching the store
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Check { dry_run } => {
            let path = cli.path.ok_or("Store path required for check")?;
            commands::check::run(&path, dry_run)?;
        }
        Commands::Version => {
            println!("Roost CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
