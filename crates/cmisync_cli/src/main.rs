//! cmisync CLI
//!
//! Command-line tools for offline SCORM attempt stores.
//!
//! # Commands
//!
//! - `attempts` - List offline attempts
//! - `tracks` - Show the tracks of an attempt
//! - `snapshot` - Show the remote snapshot of an attempt
//! - `delete` - Delete an attempt and its tracks

mod commands;

use clap::{Parser, Subcommand};
use commands::OutputFormat;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Offline SCORM attempt store tools.
#[derive(Parser)]
#[command(name = "cmisync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the SQLite store
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Learner whose attempts are shown
    #[arg(global = true, short, long, default_value = "0")]
    user: u64,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List offline attempts
    Attempts {
        /// Only attempts of this activity
        #[arg(short, long)]
        scorm: Option<u64>,

        /// Include attempts of every learner
        #[arg(short, long)]
        all_users: bool,
    },

    /// Show the tracks of an attempt
    Tracks {
        /// Activity id
        scorm: u64,

        /// Attempt number
        attempt: u32,

        /// Only tracks not yet sent
        #[arg(long)]
        unsynced: bool,
    },

    /// Show the remote snapshot of an attempt
    Snapshot {
        /// Activity id
        scorm: u64,

        /// Attempt number
        attempt: u32,
    },

    /// Delete an attempt and its tracks
    Delete {
        /// Activity id
        scorm: u64,

        /// Attempt number
        attempt: u32,

        /// Dry run - show what would be deleted
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
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("cmisync CLI v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let path = cli.path.ok_or("Store path required")?;
    let store = commands::open_store(&path, cli.user)?;
    let format = cli.format;

    match cli.command {
        Commands::Attempts { scorm, all_users } => {
            commands::attempts::run(&store, scorm, all_users, format)?;
        }
        Commands::Tracks {
            scorm,
            attempt,
            unsynced,
        } => {
            commands::tracks::run(&store, scorm, attempt, unsynced, format)?;
        }
        Commands::Snapshot { scorm, attempt } => {
            commands::snapshot::run(&store, scorm, attempt, format)?;
        }
        Commands::Delete {
            scorm,
            attempt,
            dry_run,
        } => {
            commands::delete::run(&store, scorm, attempt, dry_run, format)?;
        }
        Commands::Version => {}
    }

    Ok(())
}
