//! Queue sender.
//!
//! Per invocation the sender moves `idle → draining → (acknowledged |
//! deferred | failed) → idle`. Entries are deleted only after the remote
//! acknowledges them, so every failure path leaves the batch queued.

use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::features::Features;
use crate::module::{module_digest, ModuleRegistry};
use crate::transport::RemoteEndpoint;
use edgesync_codec::Value;
use edgesync_protocol::{
    Actor, ChecksumRecord, Codec, Partition, QueueEntry, RemoteReply, SyncActionsRequest,
    CHECKSUM_QUEUE_ID,
};
use edgesync_store::{StateStore, SyncQueues};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Action name of a checksum transmission.
pub const SYNC_CHECKSUM_ACTION: &str = "sync_checksum";

/// Result of one [`Sender::do_sync_outcome`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// A batch was acknowledged and `deleted` entries were removed.
    Sent {
        /// Partition the batch came from.
        partition: Partition,
        /// Entries removed from the partition.
        deleted: usize,
    },
    /// Both partitions are empty.
    Empty,
    /// The remote asked not to send before `until`.
    Deferred {
        /// Earliest time of the next attempt.
        until: u64,
    },
    /// The attempt failed; the batch stays queued.
    Failed {
        /// What went wrong.
        reason: String,
    },
    /// A drain is already running in this invocation.
    Busy,
}

impl SendOutcome {
    /// Returns true if a batch was acknowledged.
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent { .. })
    }
}

/// Sender counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SenderStats {
    /// Batches acknowledged.
    pub batches_sent: u64,
    /// Entries removed after acknowledgment.
    pub items_sent: u64,
    /// Attempts skipped or answered with a retry-after hint.
    pub deferrals: u64,
    /// Attempts that failed.
    pub failures: u64,
    /// Checksum transmissions acknowledged.
    pub checksums_sent: u64,
    /// Last failure message.
    pub last_error: Option<String>,
    /// Time of the last acknowledged batch.
    pub last_sent_at: Option<u64>,
}

struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drains the queues to the remote endpoint.
pub struct Sender {
    queues: Arc<SyncQueues>,
    modules: Arc<ModuleRegistry>,
    features: Features,
    endpoint: Arc<dyn RemoteEndpoint>,
    clock: Arc<dyn Clock>,
    codec: Box<dyn Codec>,
    batch_max_items: usize,
    batch_max_bytes: usize,
    chunk_size: usize,
    draining: AtomicBool,
    next_sync_time: Mutex<Option<u64>>,
    stats: RwLock<SenderStats>,
}

impl Sender {
    /// Creates a sender using the configured codec and limits.
    ///
    /// Module activation is read from `state`; deactivated modules get no
    /// checksum.
    pub fn new(
        config: &SyncConfig,
        queues: Arc<SyncQueues>,
        modules: Arc<ModuleRegistry>,
        state: Arc<StateStore>,
        endpoint: Arc<dyn RemoteEndpoint>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let features = Features::from_registry(state, &modules);
        Self {
            queues,
            modules,
            features,
            endpoint,
            clock,
            codec: config.codec.build(),
            batch_max_items: config.batch_max_items.max(1),
            batch_max_bytes: config.batch_max_bytes,
            chunk_size: config.full_sync_chunk_size.max(1),
            draining: AtomicBool::new(false),
            next_sync_time: Mutex::new(None),
            stats: RwLock::new(SenderStats::default()),
        }
    }

    /// Sends one batch. Returns true if it was acknowledged.
    pub fn do_sync(&self) -> bool {
        self.do_sync_outcome().is_sent()
    }

    /// Sends one batch and reports what happened.
    pub fn do_sync_outcome(&self) -> SendOutcome {
        if self.draining.swap(true, Ordering::SeqCst) {
            tracing::debug!("drain already running");
            return SendOutcome::Busy;
        }
        let _guard = DrainGuard(&self.draining);

        let now = self.clock.now();
        if let Some(until) = self.pending_hint(now) {
            self.stats.write().deferrals += 1;
            return SendOutcome::Deferred { until };
        }

        let partition = if self.queues.partition(Partition::FullSync).is_empty() {
            Partition::Regular
        } else {
            Partition::FullSync
        };

        let batch = match self
            .queues
            .peek_batch(partition, self.batch_max_items, self.batch_max_bytes)
        {
            Ok(batch) => batch,
            Err(e) => return self.fail(partition, &SyncError::from(e)),
        };
        if batch.is_empty() {
            return SendOutcome::Empty;
        }

        let ids: Vec<u64> = batch.iter().map(|entry| entry.id).collect();
        let request = match self.request_for(&batch, now, partition.as_str()) {
            Ok(request) => request,
            Err(e) => return self.fail(partition, &e),
        };

        tracing::debug!(
            partition = %partition,
            entries = ids.len(),
            bytes = request.payload.len(),
            codec = %request.codec_name,
            "sending batch"
        );

        match self.endpoint.invoke(&request) {
            Ok(RemoteReply::Ack) => self.acknowledge(partition, &ids, now),
            Ok(RemoteReply::Processed(processed)) => {
                let acked: Vec<u64> = processed
                    .into_iter()
                    .filter(|id| ids.contains(id))
                    .collect();
                if acked.is_empty() {
                    let err = SyncError::RemoteRejection("remote processed no entries".into());
                    return self.fail(partition, &err);
                }
                self.acknowledge(partition, &acked, now)
            }
            Ok(RemoteReply::RetryAfter { at }) if at > now => {
                tracing::info!(partition = %partition, retry_after = at, "remote asked to back off");
                *self.next_sync_time.lock() = Some(at);
                self.stats.write().deferrals += 1;
                SendOutcome::Deferred { until: at }
            }
            Ok(RemoteReply::RetryAfter { at }) => {
                let err = SyncError::RemoteRejection(format!("retry-after {at} is not in the future"));
                self.fail(partition, &err)
            }
            Err(e) => self.fail(partition, &e),
        }
    }

    /// The last retry-after hint, if any.
    pub fn get_next_sync_time(&self) -> Option<u64> {
        *self.next_sync_time.lock()
    }

    /// Returns true while a drain is running.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Current counters.
    pub fn stats(&self) -> SenderStats {
        self.stats.read().clone()
    }

    /// Name of the active codec.
    pub fn codec_name(&self) -> &'static str {
        self.codec.name()
    }

    /// Digests of every active module and both queue partitions.
    pub fn compute_checksums(&self) -> SyncResult<Vec<ChecksumRecord>> {
        let now = self.clock.now();
        let mut records = Vec::with_capacity(self.modules.len() + Partition::ALL.len());

        for module in self.modules.iter() {
            if !self.features.is_module_activated(module.name())? {
                continue;
            }
            let (value, items) = module_digest(&**module, self.chunk_size)?;
            records.push(ChecksumRecord {
                scope: module.name().to_string(),
                value,
                items,
                computed_at: now,
            });
        }

        for partition in [Partition::Regular, Partition::FullSync] {
            let (value, items) = self.queues.partition(partition).checksum_all()?;
            records.push(ChecksumRecord {
                scope: format!("queue.{partition}"),
                value,
                items,
                computed_at: now,
            });
        }

        Ok(records)
    }

    /// Computes and transmits checksums as a one-entry batch.
    ///
    /// Returns false if the remote did not accept them. Only local failures
    /// (reading a module or the queue) are errors.
    pub fn send_checksum(&self) -> SyncResult<bool> {
        let now = self.clock.now();
        if let Some(until) = self.pending_hint(now) {
            tracing::debug!(retry_after = until, "checksum deferred");
            return Ok(false);
        }

        let records = self.compute_checksums()?;
        let entry = QueueEntry {
            id: 0,
            action_name: SYNC_CHECKSUM_ACTION.to_string(),
            action_args: records.iter().map(ChecksumRecord::to_value).collect::<Vec<Value>>(),
            actor: Actor::SYSTEM,
            timestamp: now,
            enqueued_at: now,
        };
        let request = self.request_for(std::slice::from_ref(&entry), now, CHECKSUM_QUEUE_ID)?;

        match self.endpoint.invoke(&request) {
            Ok(RemoteReply::Ack | RemoteReply::Processed(_)) => {
                tracing::info!(scopes = records.len(), "checksums sent");
                self.stats.write().checksums_sent += 1;
                Ok(true)
            }
            Ok(RemoteReply::RetryAfter { at }) => {
                if at > now {
                    *self.next_sync_time.lock() = Some(at);
                }
                self.stats.write().deferrals += 1;
                Ok(false)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to send checksums");
                let mut stats = self.stats.write();
                stats.failures += 1;
                stats.last_error = Some(e.to_string());
                Ok(false)
            }
        }
    }

    /// Returns a hint that is still in the future; clears one that has passed.
    fn pending_hint(&self, now: u64) -> Option<u64> {
        let mut next = self.next_sync_time.lock();
        match *next {
            Some(at) if at > now => Some(at),
            Some(_) => {
                *next = None;
                None
            }
            None => None,
        }
    }

    fn request_for(
        &self,
        entries: &[QueueEntry],
        now: u64,
        queue_id: &str,
    ) -> SyncResult<SyncActionsRequest> {
        let payload = self.codec.encode(entries)?;
        Ok(SyncActionsRequest::new(
            payload,
            self.codec.name(),
            now,
            queue_id,
        ))
    }

    fn acknowledge(&self, partition: Partition, ids: &[u64], now: u64) -> SendOutcome {
        match self.queues.delete(partition, ids) {
            Ok(deleted) => {
                tracing::debug!(partition = %partition, deleted, "batch acknowledged");
                let mut stats = self.stats.write();
                stats.batches_sent += 1;
                stats.items_sent += deleted as u64;
                stats.last_sent_at = Some(now);
                stats.last_error = None;
                SendOutcome::Sent { partition, deleted }
            }
            Err(e) => self.fail(partition, &SyncError::from(e)),
        }
    }

    fn fail(&self, partition: Partition, error: &SyncError) -> SendOutcome {
        tracing::warn!(partition = %partition, error = %error, retryable = error.is_retryable(), "send failed");
        let reason = error.to_string();
        let mut stats = self.stats.write();
        stats.failures += 1;
        stats.last_error = Some(reason.clone());
        SendOutcome::Failed { reason }
    }
}

impl std::fmt::Debug for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender")
            .field("codec", &self.codec.name())
            .field("batch_max_items", &self.batch_max_items)
            .field("batch_max_bytes", &self.batch_max_bytes)
            .field("next_sync_time", &self.get_next_sync_time())
            .finish()
    }
}
