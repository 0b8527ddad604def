//! DBSync CLI
//!
//! Command-line tools for DBSync databases.
//!
//! # Commands
//!
//! - `inspect` - Display tables and row counts
//! - `refresh` - Replace a table with a snapshot and print the differences
//! - `sync` - Apply rows by primary key and print the differences
//! - `select` - Print the rows matching a query
//! - `delete` - Delete rows by key or filter
//! - `replay` - Run a script of operations against one session
//!
//! Events are printed one JSON object per line.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// DBSync command-line tools.
#[derive(Parser)]
#[command(name = "dbsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database file; an in-memory database is used when omitted
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// File holding the creation statements for a new database
    #[arg(global = true, short, long)]
    schema: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display tables and row counts
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Replace a table's contents with a snapshot
    Refresh {
        /// Snapshot request file (`{"table": .., "data": [..]}`)
        request: PathBuf,
    },

    /// Insert or update rows by primary key
    Sync {
        /// Row sync request file (`{"table": .., "data": ..}`)
        request: PathBuf,
    },

    /// Print the rows of a table
    Select {
        /// Table to read
        table: String,

        /// Query file; every row is printed when omitted
        #[arg(short, long)]
        query: Option<PathBuf>,
    },

    /// Delete rows by primary key or filter
    Delete {
        /// Delete request file (`{"table": .., "query": ..}`)
        request: PathBuf,
    },

    /// Run a script of operations against one session
    Replay {
        /// Script file: a JSON array of steps
        script: PathBuf,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let target = commands::Target {
        path: cli.path,
        schema: cli.schema,
    };

    match cli.command {
        Commands::Inspect { format } => commands::inspect::run(&target, &format)?,
        Commands::Refresh { request } => commands::refresh::run(&target, &request)?,
        Commands::Sync { request } => commands::sync::run(&target, &request)?,
        Commands::Select { table, query } => {
            commands::select::run(&target, &table, query.as_deref())?;
        }
        Commands::Delete { request } => commands::delete::run(&target, &request)?,
        Commands::Replay { script } => commands::replay::run(&target, &script)?,
        Commands::Version => {
            println!("DBSync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("DBSync Core v{}", dbsync_core::VERSION);
        }
    }

    Ok(())
}
