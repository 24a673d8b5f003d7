//! CLI command implementations.

pub mod checksum;
pub mod dump_queue;
pub mod inspect;
pub mod modules;

use edgesync_engine::SyncError;
use edgesync_store::{DataDir, StoreError};
use std::path::Path;
use thiserror::Error;

/// Errors reported by the CLI.
#[derive(Error, Debug)]
pub enum CliError {
    /// A command needs `--path`.
    #[error("data directory path required for {0}")]
    MissingPath(&'static str),

    /// The data directory could not be read.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An engine operation failed.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// JSON output failed.
    #[error("json output failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type of the commands.
pub type CliResult<T> = Result<T, CliError>;

/// How results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Opens an existing data directory. Tools never create one.
pub fn open_dir(path: &Path) -> CliResult<DataDir> {
    Ok(DataDir::open(path, false)?)
}

/// Prints `value` as pretty JSON.
pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Formats a byte count.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
