//! Relica CLI
//!
//! Command-line tools for change-tracked, file-backed Relica stores.
//!
//! # Commands
//!
//! - `put` / `delete` / `list` - Write and read records (writes are rectified)
//! - `changes` - Show the change ledger
//! - `checkpoint` - Show or advance the checkpoint
//! - `rectify` - Run a maintenance sweep
//! - `replicate` - Run one replication round into another store
//! - `compact` - Rewrite the store log to live records only

mod commands;

use clap::{Parser, Subcommand};
use commands::StoreArgs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Relica change-tracking and replication tools.
#[derive(Parser)]
#[command(name = "relica")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store log file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Model name to operate on
    #[arg(global = true, short, long, default_value = "todo")]
    model: String,

    /// Connector name (defaults to the store file stem)
    #[arg(global = true, long)]
    connector: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert or replace a record
    Put {
        /// Record id
        id: String,

        /// Record fields as a JSON object
        #[arg(default_value = "{}")]
        fields: String,
    },

    /// Delete a record
    Delete {
        /// Record id
        id: String,
    },

    /// List records
    List {
        /// Only records where FIELD=VALUE (repeatable)
        #[arg(short = 'w', long = "where")]
        conditions: Vec<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show changes newer than a checkpoint
    Changes {
        /// Only changes with a checkpoint greater than this
        #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
        since: i64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the current checkpoint, or advance it
    Checkpoint {
        /// Allocate the next checkpoint
        #[arg(short, long)]
        advance: bool,
    },

    /// Rectify every record against the change ledger
    Rectify,

    /// Replicate pending changes into another store
    Replicate {
        /// Path to the target store log file
        #[arg(short, long)]
        to: PathBuf,

        /// Connector name of the target (defaults to its file stem)
        #[arg(long)]
        to_connector: Option<String>,

        /// Offer changes newer than this checkpoint (defaults to where the
        /// last round into the same target stopped, or everything)
        #[arg(short, long, allow_negative_numbers = true)]
        since: Option<i64>,

        /// Only offer records where FIELD=VALUE (repeatable)
        #[arg(short = 'w', long = "where")]
        conditions: Vec<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Rewrite the store log to live records only
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

    if let Commands::Version = cli.command {
        println!("Relica CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("Relica Core v{}", relica_core::VERSION);
        return Ok(());
    }

    let path = cli.path.ok_or("Store path required (--path)")?;
    let store = StoreArgs::new(path, cli.connector, cli.model);

    match cli.command {
        Commands::Put { id, fields } => commands::records::put(&store, &id, &fields)?,
        Commands::Delete { id } => commands::records::delete(&store, &id)?,
        Commands::List { conditions, format } => {
            commands::records::list(&store, &conditions, &format)?
        }
        Commands::Changes { since, format } => commands::changes::run(&store, since, &format)?,
        Commands::Checkpoint { advance } => commands::checkpoint::run(&store, advance)?,
        Commands::Rectify => commands::rectify::run(&store)?,
        Commands::Replicate {
            to,
            to_connector,
            since,
            conditions,
            format,
        } => {
            let target = StoreArgs::new(to, to_connector, store.model.clone());
            commands::replicate::run(&store, &target, since, &conditions, &format)?;
        }
        Commands::Compact => commands::compact::run(&store)?,
        Commands::Version => {}
    }

    Ok(())
}
