//! EdgeSync CLI
//!
//! Command-line tools for EdgeSync data directories.
//!
//! # Commands
//!
//! - `inspect` - Display queue sizes, log sizes and full-sync progress
//! - `dump-queue` - Print the pending entries of a partition
//! - `checksum` - Compute queue digests
//! - `modules` - List, activate or deactivate modules
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use commands::{CliError, OutputFormat};
use edgesync_engine::SyncConfig;
use edgesync_protocol::Partition;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// EdgeSync command-line tools.
#[derive(Parser)]
#[command(name = "edgesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Path to a JSON configuration file
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display queue and job statistics
    Inspect {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Print pending entries of a queue partition
    DumpQueue {
        /// Partition to dump (regular, full_sync)
        #[arg(long, default_value = "regular")]
        partition: Partition,

        /// Maximum number of entries to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Compute digests of the queue partitions
    Checksum {
        /// Only this partition
        #[arg(long)]
        partition: Option<Partition>,

        /// First id of the range
        #[arg(long, default_value_t = 0)]
        from: u64,

        /// Last id of the range
        #[arg(long, default_value_t = u64::MAX)]
        to: u64,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Manage module activation
    Modules {
        #[command(subcommand)]
        action: ModulesAction,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum ModulesAction {
    /// List modules and their state
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Activate a module
    Activate {
        /// Module name
        name: String,
    },
    /// Deactivate a module
    Deactivate {
        /// Module name
        name: String,
    },
}

fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => SyncConfig::from_json_file(path)?,
        None => SyncConfig::default(),
    };
    tracing::debug!(codec = %config.codec, modules = config.modules.len(), "configuration loaded");

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or(CliError::MissingPath("inspect"))?;
            commands::inspect::run(&path, format)?;
        }
        Commands::DumpQueue {
            partition,
            limit,
            format,
        } => {
            let path = cli.path.ok_or(CliError::MissingPath("dump-queue"))?;
            commands::dump_queue::run(&path, partition, limit, format)?;
        }
        Commands::Checksum {
            partition,
            from,
            to,
            format,
        } => {
            let path = cli.path.ok_or(CliError::MissingPath("checksum"))?;
            commands::checksum::run(&path, partition, from..=to, format)?;
        }
        Commands::Modules { action } => {
            let path = cli.path.ok_or(CliError::MissingPath("modules"))?;
            match action {
                ModulesAction::List { format } => commands::modules::list(&path, &config, format)?,
                ModulesAction::Activate { name } => {
                    commands::modules::set_active(&path, &config, &name, true)?
                }
                ModulesAction::Deactivate { name } => {
                    commands::modules::set_active(&path, &config, &name, false)?
                }
            }
        }
        Commands::Version => {
            println!("EdgeSync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("EdgeSync Engine v{}", edgesync_engine::VERSION);
            println!("Codec: {}", config.codec);
        }
    }

    Ok(())
}
