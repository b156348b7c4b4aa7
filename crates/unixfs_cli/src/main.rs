//! UnixFS CLI
//!
//! Command-line tools for UnixFS journal stores.
//!
//! # Commands
//!
//! - `inspect` - Display counters, journal geometry and DataStore statistics
//! - `dump` - Dump journal entries for debugging
//! - `verify` - Verify journal entries and counters
//! - `get` / `put` / `delete` - Read and write single keys
//! - `recover` - Replay the journal into the DataStore
//! - `compact` - Rewrite the DataStore log with live state only

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use unixfs_core::ChecksumAlgorithm;

/// UnixFS journal store tools.
#[derive(Parser)]
#[command(name = "unixfs")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the storage directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Journal capacity used when creating a store
    #[arg(global = true, long)]
    capacity: Option<u64>,

    /// Checksum algorithm used when creating a store (adler32, crc32, crc32c)
    #[arg(global = true, long)]
    checksum: Option<ChecksumAlgorithm>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display counters, journal geometry and DataStore statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump journal entries for debugging
    Dump {
        /// Maximum number of entries to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Start from this sequence
        #[arg(long, default_value = "0")]
        from: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify journal entries and counters
    Verify,

    /// Print the value of a key
    Get {
        /// Key (UTF-8)
        key: String,
    },

    /// Commit a single put
    Put {
        /// Key (UTF-8)
        key: String,
        /// Value (UTF-8)
        value: String,
    },

    /// Commit a single delete
    Delete {
        /// Key (UTF-8)
        key: String,
    },

    /// Replay published journal entries into the DataStore
    Recover,

    /// Rewrite the DataStore log with live state only
    Compact,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let options = commands::OpenOptions {
        capacity: cli.capacity,
        checksum: cli.checksum,
    };

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Dump {
            limit,
            from,
            format,
        } => {
            let path = cli.path.ok_or("Store path required for dump")?;
            commands::dump::run(&path, from, limit, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Store path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Get { key } => {
            let path = cli.path.ok_or("Store path required for get")?;
            commands::kv::get(&path, &options, &key)?;
        }
        Commands::Put { key, value } => {
            let path = cli.path.ok_or("Store path required for put")?;
            commands::kv::put(&path, &options, &key, &value)?;
        }
        Commands::Delete { key } => {
            let path = cli.path.ok_or("Store path required for delete")?;
            commands::kv::delete(&path, &options, &key)?;
        }
        Commands::Recover => {
            let path = cli.path.ok_or("Store path required for recover")?;
            commands::recover::run(&path)?;
        }
        Commands::Compact => {
            let path = cli.path.ok_or("Store path required for compact")?;
            commands::compact::run(&path)?;
        }
        Commands::Version => {
            println!("UnixFS CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("UnixFS Core v{}", unixfs_core::VERSION);
        }
    }

    Ok(())
}
