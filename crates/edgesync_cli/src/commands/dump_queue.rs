//! Dump queue command implementation.

use super::{open_dir, print_json, CliResult, OutputFormat};
use edgesync_protocol::{Partition, QueueEntry};
use edgesync_store::DataDir;
use std::path::Path;

/// Runs the dump-queue command.
pub fn run(
    path: &Path,
    partition: Partition,
    limit: Option<usize>,
    format: OutputFormat,
) -> CliResult<()> {
    let entries = read_entries(&open_dir(path)?, partition, limit)?;
    match format {
        OutputFormat::Json => print_json(&entries)?,
        OutputFormat::Text => print_text_output(partition, &entries),
    }
    Ok(())
}

/// Pending entries of a partition in id order.
pub fn read_entries(
    dir: &DataDir,
    partition: Partition,
    limit: Option<usize>,
) -> CliResult<Vec<QueueEntry>> {
    let queue = dir.open_queue_read_only(partition)?;
    let mut entries = queue.entries();
    if let Some(limit) = limit {
        entries.truncate(limit);
    }
    Ok(entries)
}

fn print_text_output(partition: Partition, entries: &[QueueEntry]) {
    println!("Queue {partition}: {} entries", entries.len());
    for entry in entries {
        let args: Vec<String> = entry.action_args.iter().map(ToString::to_string).collect();
        println!(
            "  #{:<6} {:<24} [{}] by {} at {}",
            entry.id,
            entry.action_name,
            args.join(", "),
            entry.actor,
            entry.timestamp
        );
    }
}
