//! Per-invocation entry point.
//!
//! Build one [`Orchestrator`] per request or scheduler tick. It owns that
//! invocation's [`Listener`], [`Sender`] and [`FullSync`]; nothing is shared
//! through globals.

use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::fabric::MutationFabric;
use crate::features::Features;
use crate::full_sync::{FullSync, SyncJob};
use crate::listener::Listener;
use crate::module::ModuleRegistry;
use crate::policy::{ActivationPolicy, DefaultPolicy, InvocationContext};
use crate::scheduler::{
    ScheduledJob, Scheduler, CRON_SYNC_JOB, FULL_SYNC_JOB, SEND_CHECKSUM_JOB,
};
use crate::sender::{SendOutcome, Sender};
use crate::transport::RemoteEndpoint;
use edgesync_store::{StateStore, SyncQueues};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Collaborators shared by every component of an invocation.
#[derive(Clone)]
pub struct SyncServices {
    /// Both queue partitions.
    pub queues: Arc<SyncQueues>,
    /// Job progress and module state.
    pub state: Arc<StateStore>,
    /// Modules available to full sync and checksums.
    pub modules: Arc<ModuleRegistry>,
    /// The remote side.
    pub endpoint: Arc<dyn RemoteEndpoint>,
    /// Where mutations are announced.
    pub fabric: Arc<dyn MutationFabric>,
    /// External timer facility.
    pub scheduler: Arc<dyn Scheduler>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
}

/// What [`Orchestrator::init`] decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Activation {
    /// The sync gate was open.
    pub sync_allowed: bool,
    /// The listener was started.
    pub listener: bool,
    /// The sender was started and the end-of-invocation flush armed.
    pub sender: bool,
}

/// Why the cron loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CronStop {
    /// Nothing left to send.
    Drained,
    /// An attempt failed without a retry-after hint.
    Failed,
    /// Another drain was running.
    Busy,
    /// The remote backoff reaches past the horizon.
    Backoff {
        /// Requested retry time.
        until: u64,
    },
    /// The loop used up its time budget.
    Horizon,
    /// Sync is not allowed on this site.
    Gated,
}

/// Summary of one [`Orchestrator::do_cron_sync`] run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CronReport {
    /// `do_sync` calls made.
    pub attempts: u32,
    /// Batches acknowledged.
    pub batches_sent: u32,
    /// Seconds spent sleeping on backoff.
    pub slept_secs: u64,
    /// Why the loop ended.
    pub stop: CronStop,
}

impl CronReport {
    fn gated() -> Self {
        Self {
            attempts: 0,
            batches_sent: 0,
            slept_secs: 0,
            stop: CronStop::Gated,
        }
    }
}

/// Wires policy, scheduling and the sync components for one invocation.
pub struct Orchestrator {
    config: SyncConfig,
    services: SyncServices,
    policy: Box<dyn ActivationPolicy>,
    listener: Listener,
    sender: Sender,
    full_sync: FullSync,
    flush_armed: AtomicBool,
}

impl Orchestrator {
    /// Creates an orchestrator with the default activation policy.
    pub fn new(config: SyncConfig, services: SyncServices) -> Self {
        let listener = Listener::new(
            Arc::clone(&services.queues),
            config.events.clone(),
            Arc::clone(&services.clock),
        );
        let sender = Sender::new(
            &config,
            Arc::clone(&services.queues),
            Arc::clone(&services.modules),
            Arc::clone(&services.state),
            Arc::clone(&services.endpoint),
            Arc::clone(&services.clock),
        );
        let full_sync = FullSync::new(
            &config,
            Arc::clone(&services.queues),
            Arc::clone(&services.state),
            Arc::clone(&services.modules),
            Arc::clone(&services.clock),
        );

        Self {
            config,
            services,
            policy: Box::new(DefaultPolicy),
            listener,
            sender,
            full_sync,
            flush_armed: AtomicBool::new(false),
        }
    }

    /// Replaces the activation policy.
    #[must_use]
    pub fn with_policy(mut self, policy: impl ActivationPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Evaluates the gate and the activation policy for this invocation.
    ///
    /// Registers the recurring jobs, starts the listener and arms the
    /// end-of-invocation flush as the policy decides. Does nothing when
    /// sync is not allowed.
    pub fn init(&self, ctx: &InvocationContext) -> Activation {
        if !self.config.sync_allowed() {
            tracing::debug!(site = ?self.config.site, "sync not allowed, staying idle");
            return Activation {
                sync_allowed: false,
                listener: false,
                sender: false,
            };
        }

        self.register_jobs();

        let ctx = ctx.with_test_mode(ctx.test_mode || self.config.test_mode);
        let listener = self
            .policy
            .should_start_listener(&ctx, ctx.default_listener());
        let sender = self.policy.should_start_sender(&ctx, ctx.default_sender());

        if listener {
            self.listener.start(&*self.services.fabric);
        }
        if sender {
            self.flush_armed.store(true, Ordering::SeqCst);
        }

        tracing::debug!(kind = ?ctx.kind, listener, sender, "invocation initialized");
        Activation {
            sync_allowed: true,
            listener,
            sender,
        }
    }

    /// Runs the end-of-invocation flush if the sender was started.
    pub fn end_invocation(&self) -> Option<SendOutcome> {
        if !self.flush_armed.swap(false, Ordering::SeqCst) {
            return None;
        }
        Some(self.sender.do_sync_outcome())
    }

    /// Drains the queues until empty, failing, or out of time.
    ///
    /// A retry-after hint up to the horizon away is waited out with a
    /// blocking sleep; a longer one ends the loop. Total sleeping never
    /// exceeds the horizon.
    pub fn do_cron_sync(&self) -> CronReport {
        if !self.config.sync_allowed() {
            return CronReport::gated();
        }

        if let Err(e) = self.full_sync.continue_enqueuing() {
            tracing::warn!(error = %e, "could not resume full sync");
        }

        let clock = &self.services.clock;
        let horizon = self.config.cron_horizon_secs;
        let started = clock.now();
        let mut report = CronReport {
            attempts: 0,
            batches_sent: 0,
            slept_secs: 0,
            stop: CronStop::Drained,
        };

        loop {
            if report.attempts > 0 && clock.now().saturating_sub(started) >= horizon {
                report.stop = CronStop::Horizon;
                break;
            }

            report.attempts += 1;
            let outcome = self.sender.do_sync_outcome();
            let stop = match outcome {
                SendOutcome::Sent { .. } => {
                    report.batches_sent += 1;
                    continue;
                }
                SendOutcome::Empty => CronStop::Drained,
                SendOutcome::Busy => CronStop::Busy,
                SendOutcome::Deferred { until } => CronStop::Backoff { until },
                SendOutcome::Failed { .. } => CronStop::Failed,
            };

            let Some(next) = self.sender.get_next_sync_time() else {
                report.stop = stop;
                break;
            };

            let delay = i128::from(next) - i128::from(clock.now()) + 1;
            if delay <= 0 {
                continue;
            }
            let delay = u64::try_from(delay).unwrap_or(u64::MAX);
            if delay > horizon || report.slept_secs.saturating_add(delay) > horizon {
                tracing::debug!(retry_after = next, delay, "backoff exceeds cron horizon");
                report.stop = CronStop::Backoff { until: next };
                break;
            }

            tracing::debug!(delay, "waiting out remote backoff");
            clock.sleep(delay);
            report.slept_secs += delay;
        }

        tracing::info!(
            attempts = report.attempts,
            batches = report.batches_sent,
            slept = report.slept_secs,
            stop = ?report.stop,
            "cron sync finished"
        );
        report
    }

    /// Schedules a full sync of `modules` (empty means all) shortly from now.
    ///
    /// Returns false when sync is not allowed.
    pub fn schedule_full_sync(&self, modules: &[String]) -> SyncResult<bool> {
        if !self.config.sync_allowed() {
            return Ok(false);
        }
        let features = self.features();
        for name in modules {
            if !features.is_module_activated(name)? {
                return Err(SyncError::InactiveModule(name.clone()));
            }
        }

        self.services.scheduler.schedule_once(
            FULL_SYNC_JOB,
            self.config.full_sync_delay_secs,
            ScheduledJob::FullSync(modules.to_vec()),
        );
        tracing::info!(?modules, "full sync scheduled");
        Ok(true)
    }

    /// Starts a full sync now and sends the first batch.
    ///
    /// Returns `None` when sync is not allowed.
    pub fn do_full_sync(&self, modules: &[String]) -> SyncResult<Option<SyncJob>> {
        if !self.config.sync_allowed() {
            return Ok(None);
        }

        self.listener.start(&*self.services.fabric);
        let requested = (!modules.is_empty()).then_some(modules);
        let job = self.full_sync.start(requested)?;
        self.do_send_pending_data();
        Ok(Some(job))
    }

    /// Sends one batch right away.
    pub fn do_send_pending_data(&self) -> SendOutcome {
        self.sender.do_sync_outcome()
    }

    /// Transmits checksums. Returns false when gated or not accepted.
    pub fn send_checksum(&self) -> SyncResult<bool> {
        if !self.config.sync_allowed() {
            return Ok(false);
        }
        self.sender.send_checksum()
    }

    /// Runs a job handed back by the scheduler.
    pub fn run_job(&self, job: &ScheduledJob) -> SyncResult<()> {
        tracing::debug!(?job, "running scheduled job");
        match job {
            ScheduledJob::CronSync => {
                self.do_cron_sync();
            }
            ScheduledJob::SendChecksum => {
                self.send_checksum()?;
            }
            ScheduledJob::FullSync(modules) => {
                self.do_full_sync(modules)?;
            }
        }
        Ok(())
    }

    /// The configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// This invocation's listener.
    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    /// This invocation's sender.
    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    /// This invocation's full-sync subsystem.
    pub fn full_sync(&self) -> &FullSync {
        &self.full_sync
    }

    /// Module-state API over the registered modules.
    pub fn features(&self) -> Features {
        Features::from_registry(Arc::clone(&self.services.state), &self.services.modules)
    }

    fn register_jobs(&self) {
        let scheduler = &self.services.scheduler;
        if !scheduler.is_scheduled(CRON_SYNC_JOB) {
            scheduler.schedule_recurring(
                CRON_SYNC_JOB,
                self.config.cron_interval_secs,
                ScheduledJob::CronSync,
            );
        }
        if !scheduler.is_scheduled(SEND_CHECKSUM_JOB) {
            scheduler.schedule_recurring(
                SEND_CHECKSUM_JOB,
                self.config.checksum_interval_secs,
                ScheduledJob::SendChecksum,
            );
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("listener", &self.listener)
            .field("sender", &self.sender)
            .field("flush_armed", &self.flush_armed.load(Ordering::SeqCst))
            .finish()
    }
}
