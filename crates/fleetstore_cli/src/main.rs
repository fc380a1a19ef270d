//! fleetstore CLI
//!
//! Command-line tools for fleetstore document files.
//!
//! # Commands
//!
//! - `inspect` - Display document metadata and collection sizes
//! - `verify` - Check the document's cross-record invariants
//! - `backup` - Take or list rotating backups
//! - `recover` - Recover from residual files, a backup, or a given file
//! - `resources` - Print fleet resource totals per architecture
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// fleetstore command-line document tools.
#[derive(Parser)]
#[command(name = "fleetstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the document file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Encryption passphrase (defaults to ENCRYPTION_PRIVATE_KEY)
    #[arg(global = true, short, long)]
    key: Option<String>,

    /// Number of rotating backups to keep
    #[arg(global = true, short, long)]
    backups: Option<usize>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display document metadata and collection sizes
    Inspect {
        /// List backups and residual files
        #[arg(short, long)]
        files: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check the document's cross-record invariants
    Verify,

    /// Take a rotating backup
    Backup {
        /// Only list existing backups
        #[arg(short, long)]
        list: bool,
    },

    /// Recover the document
    Recover {
        /// Load the newest readable rotating backup
        #[arg(long, conflicts_with = "restore")]
        from_backup: bool,

        /// Replace the document with this file
        #[arg(long)]
        restore: Option<PathBuf>,
    },

    /// Print fleet resource totals per architecture
    Resources {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let target = |name: &str| -> Result<commands::Target, Box<dyn std::error::Error>> {
        let path = cli
            .path
            .clone()
            .ok_or_else(|| format!("Document path required for {name}"))?;
        Ok(commands::Target::new(path, cli.key.clone(), cli.backups))
    };

    match &cli.command {
        Commands::Inspect { files, format } => {
            commands::inspect::run(&target("inspect")?, *files, format)?;
        }
        Commands::Verify => {
            commands::verify::run(&target("verify")?)?;
        }
        Commands::Backup { list } => {
            commands::backup::run(&target("backup")?, *list)?;
        }
        Commands::Recover {
            from_backup,
            restore,
        } => {
            commands::recover::run(&target("recover")?, *from_backup, restore.as_deref())?;
        }
        Commands::Resources { format } => {
            commands::resources::run(&target("resources")?, format)?;
        }
        Commands::Version => {
            println!("fleetstore CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("fleetstore core v{}", fleetstore_core::VERSION);
        }
    }

    Ok(())
}
