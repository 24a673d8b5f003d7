//! Full sync.
//!
//! A full sync re-enumerates whole modules into the full-sync partition. The
//! job is persisted in the state store after every chunk, so a job that
//! runs out of budget (or hits a storage error) resumes where it stopped.
//!
//! Entries produced by one job, in order:
//!
//! ```text
//! full_sync_start [modules]
//! full_sync_<module> [module, chunk_index, items]   (per chunk, modules in name order)
//! full_sync_end [modules, total_items]
//! ```

use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::features::Features;
use crate::module::ModuleRegistry;
use edgesync_codec::Value;
use edgesync_protocol::{Actor, Partition};
use edgesync_store::{NewEntry, StateStore, SyncQueues};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// State store key of the current job.
pub const FULL_SYNC_JOB_KEY: &str = "full_sync.job";

/// Action name of the marker opening a job.
pub const FULL_SYNC_START_ACTION: &str = "full_sync_start";

/// Action name of the marker closing a job.
pub const FULL_SYNC_END_ACTION: &str = "full_sync_end";

/// Action name of a chunk of `module`.
pub fn chunk_action(module: &str) -> String {
    format!("full_sync_{module}")
}

/// Lifecycle of a full-sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created but nothing enqueued yet.
    #[default]
    NotStarted,
    /// Some modules still have chunks to enqueue.
    InProgress,
    /// Every chunk and the end marker are queued.
    Complete,
}

/// Enumeration progress of one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModuleProgress {
    /// Cursor of the next chunk.
    pub cursor: u64,
    /// The module has been fully enumerated.
    pub done: bool,
    /// Chunks enqueued so far.
    pub chunks: u64,
    /// Items enqueued so far.
    pub items: u64,
}

/// A full-sync request and its progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJob {
    /// Modules covered by the job.
    pub requested_modules: BTreeSet<String>,
    /// Current status.
    pub status: JobStatus,
    /// Progress per requested module.
    pub progress: BTreeMap<String, ModuleProgress>,
    /// When the job was requested.
    pub started_at: u64,
    /// When the end marker was queued.
    pub finished_at: Option<u64>,
}

impl SyncJob {
    fn new(requested_modules: BTreeSet<String>, now: u64) -> Self {
        let progress = requested_modules
            .iter()
            .map(|name| (name.clone(), ModuleProgress::default()))
            .collect();
        Self {
            requested_modules,
            status: JobStatus::NotStarted,
            progress,
            started_at: now,
            finished_at: None,
        }
    }

    /// Returns true once every module is enumerated.
    pub fn is_complete(&self) -> bool {
        self.status == JobStatus::Complete
    }

    /// Modules with chunks left.
    pub fn pending_modules(&self) -> Vec<String> {
        self.progress
            .iter()
            .filter(|(_, p)| !p.done)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Items enqueued over all modules.
    pub fn total_items(&self) -> u64 {
        self.progress.values().map(|p| p.items).sum()
    }

    fn module_list(&self) -> Value {
        Value::Array(
            self.requested_modules
                .iter()
                .map(|m| Value::from(m.as_str()))
                .collect(),
        )
    }
}

/// Enqueues full-sync jobs.
pub struct FullSync {
    queues: Arc<SyncQueues>,
    state: Arc<StateStore>,
    modules: Arc<ModuleRegistry>,
    clock: Arc<dyn Clock>,
    chunk_size: usize,
    chunk_budget: Option<usize>,
}

impl FullSync {
    /// Creates the full-sync subsystem.
    pub fn new(
        config: &SyncConfig,
        queues: Arc<SyncQueues>,
        state: Arc<StateStore>,
        modules: Arc<ModuleRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            queues,
            state,
            modules,
            clock,
            chunk_size: config.full_sync_chunk_size.max(1),
            chunk_budget: config.full_sync_chunks_per_invocation,
        }
    }

    /// Starts a job for `requested` modules (`None` or empty means all).
    ///
    /// Any previous job is superseded: its progress is dropped and its
    /// queued entries are purged. Returns once the chunks (or as many as
    /// the budget allows) are queued.
    pub fn start(&self, requested: Option<&[String]>) -> SyncResult<SyncJob> {
        let modules = self.resolve(requested)?;

        if let Some(previous) = self.status()? {
            if previous.status == JobStatus::InProgress {
                tracing::info!(
                    previous = ?previous.requested_modules,
                    requested = ?modules,
                    "superseding in-progress full sync"
                );
            }
        }

        let purged = self.queues.purge(Partition::FullSync)?;
        if purged > 0 {
            tracing::info!(purged, "discarded queued entries of superseded full sync");
        }

        let now = self.clock.now();
        let mut job = SyncJob::new(modules, now);
        self.queues.enqueue(
            Partition::FullSync,
            NewEntry::new(FULL_SYNC_START_ACTION, vec![job.module_list()], Actor::SYSTEM, now),
        )?;
        job.status = JobStatus::InProgress;
        self.save(&job)?;

        tracing::info!(modules = ?job.requested_modules, "full sync started");
        self.enqueue_chunks(&mut job)?;
        Ok(job)
    }

    /// Resumes an in-progress job. Returns `None` if there is nothing to resume.
    pub fn continue_enqueuing(&self) -> SyncResult<Option<SyncJob>> {
        match self.status()? {
            Some(mut job) if job.status == JobStatus::InProgress => {
                tracing::debug!(pending = ?job.pending_modules(), "resuming full sync");
                self.enqueue_chunks(&mut job)?;
                Ok(Some(job))
            }
            _ => Ok(None),
        }
    }

    /// The current (or last) job.
    pub fn status(&self) -> SyncResult<Option<SyncJob>> {
        Ok(self.state.get(FULL_SYNC_JOB_KEY)?)
    }

    /// Explicit names must be registered and active; no names means every
    /// active module.
    fn resolve(&self, requested: Option<&[String]>) -> SyncResult<BTreeSet<String>> {
        let features = Features::from_registry(Arc::clone(&self.state), &self.modules);
        match requested {
            Some(names) if !names.is_empty() => names
                .iter()
                .map(|name| {
                    if !features.is_module_activated(name)? {
                        return Err(SyncError::InactiveModule(name.clone()));
                    }
                    Ok(name.clone())
                })
                .collect(),
            _ => {
                let mut active = BTreeSet::new();
                for name in self.modules.names() {
                    if features.is_module_activated(&name)? {
                        active.insert(name);
                    }
                }
                Ok(active)
            }
        }
    }

    fn save(&self, job: &SyncJob) -> SyncResult<()> {
        self.state.put(FULL_SYNC_JOB_KEY, job)?;
        Ok(())
    }

    fn enqueue_chunks(&self, job: &mut SyncJob) -> SyncResult<()> {
        let mut budget = self.chunk_budget;
        let names: Vec<String> = job.requested_modules.iter().cloned().collect();

        for name in names {
            let module = self.modules.require(&name)?;
            loop {
                let progress = job.progress.get(&name).copied().unwrap_or_default();
                if progress.done {
                    break;
                }
                if budget == Some(0) {
                    tracing::debug!(module = %name, cursor = progress.cursor, "full sync chunk budget exhausted");
                    return Ok(());
                }

                let (items, next) = module.read_chunk(progress.cursor, self.chunk_size)?;
                let count = items.len() as u64;
                let args = vec![
                    Value::from(name.as_str()),
                    Value::Integer(i64::try_from(progress.chunks).unwrap_or(i64::MAX)),
                    Value::Array(items),
                ];
                self.queues.enqueue(
                    Partition::FullSync,
                    NewEntry::new(chunk_action(&name), args, Actor::SYSTEM, self.clock.now()),
                )?;

                let updated = ModuleProgress {
                    cursor: next.unwrap_or(progress.cursor),
                    done: next.is_none(),
                    chunks: progress.chunks + 1,
                    items: progress.items + count,
                };
                job.progress.insert(name.clone(), updated);
                if let Some(remaining) = budget.as_mut() {
                    *remaining -= 1;
                }
                self.save(job)?;
            }
        }

        let now = self.clock.now();
        let total = Value::Integer(i64::try_from(job.total_items()).unwrap_or(i64::MAX));
        self.queues.enqueue(
            Partition::FullSync,
            NewEntry::new(FULL_SYNC_END_ACTION, vec![job.module_list(), total], Actor::SYSTEM, now),
        )?;
        job.status = JobStatus::Complete;
        job.finished_at = Some(now);
        self.save(job)?;

        tracing::info!(items = job.total_items(), "full sync enqueued");
        Ok(())
    }
}

impl std::fmt::Debug for FullSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FullSync")
            .field("modules", &self.modules)
            .field("chunk_size", &self.chunk_size)
            .field("chunk_budget", &self.chunk_budget)
            .finish()
    }
}
