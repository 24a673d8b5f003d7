//! # EdgeSync Engine
//!
//! Replicates local mutations from an edge node to a remote store.
//!
//! This crate provides:
//! - [`Listener`]: captures mutation events into the regular queue
//! - [`FullSync`]: re-enumerates whole modules into the full-sync queue
//! - [`Sender`]: drains the queues through a [`Codec`](edgesync_protocol::Codec)
//!   to a [`RemoteEndpoint`] and transmits checksums
//! - [`Orchestrator`]: activation policy, job registration and the bounded
//!   cron retry loop
//! - [`Features`]: the module-state API
//!
//! ## Execution model
//!
//! There is no background process. Each request or scheduler tick builds an
//! [`Orchestrator`], calls [`Orchestrator::init`], does its work and calls
//! [`Orchestrator::end_invocation`]. Everything that must outlive the
//! invocation lives in the queues and the state store.
//!
//! ## Key Invariants
//!
//! - An entry leaves the queue only after the remote acknowledges it, or
//!   when a newer full sync supersedes it
//! - The full-sync partition is drained before the regular one
//! - At most one drain runs per invocation
//! - The cron loop never sleeps past its horizon

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod clock;
mod config;
mod error;
mod fabric;
mod features;
mod full_sync;
mod listener;
mod module;
mod orchestrator;
mod policy;
mod rpc;
mod scheduler;
mod sender;
mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EventCatalog, EventMapping, SiteStatus, SyncConfig, DEFAULT_CRON_HORIZON_SECS};
pub use error::{SyncError, SyncResult};
pub use fabric::{LocalFabric, MutationEvent, MutationFabric, MutationHandler};
pub use features::{Features, ModuleInfo};
pub use full_sync::{
    chunk_action, FullSync, JobStatus, ModuleProgress, SyncJob, FULL_SYNC_END_ACTION,
    FULL_SYNC_JOB_KEY, FULL_SYNC_START_ACTION,
};
pub use listener::Listener;
pub use module::{module_digest, ModuleDescriptor, ModuleRegistry, StaticModule, SyncModule};
pub use orchestrator::{Activation, CronReport, CronStop, Orchestrator, SyncServices};
pub use policy::{ActivationPolicy, DefaultPolicy, InvocationContext, InvocationKind};
pub use rpc::{LoopbackClient, LoopbackServer, RpcClient, RpcEndpoint};
pub use scheduler::{
    ManualScheduler, Registration, ScheduledJob, Scheduler, CRON_SYNC_JOB, FULL_SYNC_JOB,
    SEND_CHECKSUM_JOB,
};
pub use sender::{SendOutcome, Sender, SenderStats, SYNC_CHECKSUM_ACTION};
pub use transport::{MockEndpoint, MockResponse, RemoteEndpoint};
