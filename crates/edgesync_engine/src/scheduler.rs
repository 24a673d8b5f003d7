//! Job scheduling facility.
//!
//! The engine never runs a background thread. Scheduling means registering a
//! job with whatever timer the host provides; the host later calls
//! [`Orchestrator::run_job`](crate::Orchestrator::run_job) in a fresh
//! invocation.

use crate::clock::Clock;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Name of the recurring drain job.
pub const CRON_SYNC_JOB: &str = "cron_sync";

/// Name of the recurring checksum job.
pub const SEND_CHECKSUM_JOB: &str = "send_checksum";

/// Name of the one-shot full sync job.
pub const FULL_SYNC_JOB: &str = "full_sync";

/// Work a scheduled callback performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job", content = "modules", rename_all = "snake_case")]
pub enum ScheduledJob {
    /// Drain the queues within the cron horizon.
    CronSync,
    /// Transmit checksums.
    SendChecksum,
    /// Run a full sync of these modules (empty means all).
    FullSync(Vec<String>),
}

/// External timer facility.
pub trait Scheduler: Send + Sync {
    /// Registers `job` to run every `interval_secs`.
    fn schedule_recurring(&self, name: &str, interval_secs: u64, job: ScheduledJob);

    /// Registers `job` to run once, no earlier than `delay_secs` from now.
    fn schedule_once(&self, name: &str, delay_secs: u64, job: ScheduledJob);

    /// Returns true if a job with this name is registered.
    fn is_scheduled(&self, name: &str) -> bool;
}

/// A scheduler registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// The work to run.
    pub job: ScheduledJob,
    /// Earliest run time (Unix seconds).
    pub next_run: u64,
    /// Repeat interval, `None` for one-shot jobs.
    pub interval_secs: Option<u64>,
}

/// An in-memory scheduler that only fires when asked.
///
/// Used by tests and by hosts that drive ticks themselves.
pub struct ManualScheduler {
    clock: Arc<dyn Clock>,
    registrations: Mutex<BTreeMap<String, Registration>>,
}

impl ManualScheduler {
    /// Creates an empty scheduler.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            registrations: Mutex::new(BTreeMap::new()),
        }
    }

    /// Takes every job due at `now`.
    ///
    /// Recurring jobs are rescheduled one interval later; one-shot jobs are
    /// removed.
    pub fn due(&self, now: u64) -> Vec<ScheduledJob> {
        let mut registrations = self.registrations.lock();
        let mut due = Vec::new();
        let mut finished = Vec::new();

        for (name, registration) in registrations.iter_mut() {
            if registration.next_run > now {
                continue;
            }
            due.push(registration.job.clone());
            match registration.interval_secs {
                Some(interval) => registration.next_run = now + interval,
                None => finished.push(name.clone()),
            }
        }

        for name in finished {
            registrations.remove(&name);
        }
        due
    }

    /// All registrations by name.
    pub fn registrations(&self) -> BTreeMap<String, Registration> {
        self.registrations.lock().clone()
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.registrations.lock().len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.registrations.lock().is_empty()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_recurring(&self, name: &str, interval_secs: u64, job: ScheduledJob) {
        let next_run = self.clock.now() + interval_secs;
        tracing::debug!(job = name, interval_secs, "scheduling recurring job");
        self.registrations.lock().insert(
            name.to_string(),
            Registration {
                job,
                next_run,
                interval_secs: Some(interval_secs),
            },
        );
    }

    fn schedule_once(&self, name: &str, delay_secs: u64, job: ScheduledJob) {
        let next_run = self.clock.now() + delay_secs;
        tracing::debug!(job = name, delay_secs, "scheduling one-shot job");
        self.registrations.lock().insert(
            name.to_string(),
            Registration {
                job,
                next_run,
                interval_secs: None,
            },
        );
    }

    fn is_scheduled(&self, name: &str) -> bool {
        self.registrations.lock().contains_key(name)
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("registrations", &*self.registrations.lock())
            .finish()
    }
}
