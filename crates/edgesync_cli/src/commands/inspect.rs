//! Inspect command implementation.

use super::{format_size, open_dir, print_json, CliResult, OutputFormat};
use edgesync_engine::{JobStatus, SyncJob, FULL_SYNC_JOB_KEY};
use edgesync_protocol::Partition;
use edgesync_store::DataDir;
use serde::Serialize;
use std::path::Path;

/// Data directory inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Data directory path.
    pub path: String,
    /// One entry per partition, in drain order.
    pub partitions: Vec<PartitionStats>,
    /// Keys in the state store.
    pub state_keys: Vec<String>,
    /// The current or last full-sync job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_sync: Option<FullSyncSummary>,
}

/// Statistics for one partition.
#[derive(Debug, Serialize)]
pub struct PartitionStats {
    /// Partition name.
    pub partition: String,
    /// Pending entries.
    pub entries: usize,
    /// Log size in bytes.
    pub log_size: u64,
    /// Id the next entry will get.
    pub next_id: u64,
    /// Capture time of the oldest pending entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_timestamp: Option<u64>,
    /// Bytes of a torn record at the end of the log.
    pub torn_bytes: u64,
}

/// Summary of a full-sync job.
#[derive(Debug, Serialize)]
pub struct FullSyncSummary {
    /// Job status.
    pub status: JobStatus,
    /// Requested modules.
    pub modules: Vec<String>,
    /// Modules with chunks left.
    pub pending: Vec<String>,
    /// Items enqueued so far.
    pub items: u64,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: OutputFormat) -> CliResult<()> {
    let result = inspect(&open_dir(path)?)?;
    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => print_text_output(&result),
    }
    Ok(())
}

/// Collects statistics of a data directory.
pub fn inspect(dir: &DataDir) -> CliResult<InspectResult> {
    let queues = dir.open_queues_read_only()?;
    let mut partitions = Vec::new();
    for partition in Partition::ALL {
        let queue = queues.partition(partition);
        partitions.push(PartitionStats {
            partition: partition.to_string(),
            entries: queue.size(),
            log_size: queue.log_size()?,
            next_id: queue.next_id(),
            oldest_timestamp: queue.oldest_timestamp(),
            torn_bytes: queue.torn_bytes(),
        });
    }

    let state = dir.open_state_read_only()?;
    let full_sync = state
        .get::<SyncJob>(FULL_SYNC_JOB_KEY)?
        .map(|job| FullSyncSummary {
            status: job.status,
            modules: job.requested_modules.iter().cloned().collect(),
            pending: job.pending_modules(),
            items: job.total_items(),
        });

    Ok(InspectResult {
        path: dir.path().display().to_string(),
        partitions,
        state_keys: state.keys(),
        full_sync,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("EdgeSync Data Directory");
    println!("=======================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Queues:");
    for stats in &result.partitions {
        print!(
            "  {:<10} {:>6} entries  {:>10}  next id {}",
            stats.partition,
            stats.entries,
            format_size(stats.log_size),
            stats.next_id
        );
        match stats.oldest_timestamp {
            Some(ts) => println!("  oldest {ts}"),
            None => println!(),
        }
        if stats.torn_bytes > 0 {
            println!("  {:<10} torn tail of {} bytes", "", stats.torn_bytes);
        }
    }

    if let Some(job) = &result.full_sync {
        println!();
        println!("Full sync:");
        println!("  Status:  {:?}", job.status);
        println!("  Modules: {}", job.modules.join(", "));
        if !job.pending.is_empty() {
            println!("  Pending: {}", job.pending.join(", "));
        }
        println!("  Items:   {}", job.items);
    }

    println!();
    println!("State keys: {}", result.state_keys.len());
}
