//! Durable action queue.
//!
//! Each partition is its own record log. Replaying the log rebuilds the
//! pending entries and the id sequence, so ids keep increasing across
//! invocations and after the partition drains.

use crate::error::{StoreError, StoreResult};
use crate::record::{LogRecord, RecordKind, RecordLog};
use edgesync_codec::{from_cbor, to_cbor, DigestBuilder, Value};
use edgesync_protocol::{Actor, Partition, QueueEntry};
use edgesync_storage::{InMemoryBackend, StorageBackend};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

/// An action about to be queued. The queue assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    /// Serialized action name.
    pub action_name: String,
    /// Action arguments.
    pub action_args: Vec<Value>,
    /// Who triggered the action.
    pub actor: Actor,
    /// When the action happened.
    pub timestamp: u64,
    /// When the entry is written.
    pub enqueued_at: u64,
}

impl NewEntry {
    /// Creates an entry captured and enqueued at `now`.
    pub fn new(action_name: impl Into<String>, action_args: Vec<Value>, actor: Actor, now: u64) -> Self {
        Self {
            action_name: action_name.into(),
            action_args,
            actor,
            timestamp: now,
            enqueued_at: now,
        }
    }

    /// Overrides the capture time.
    #[must_use]
    pub fn captured_at(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    fn into_entry(self, id: u64) -> QueueEntry {
        QueueEntry {
            id,
            action_name: self.action_name,
            action_args: self.action_args,
            actor: self.actor,
            timestamp: self.timestamp,
            enqueued_at: self.enqueued_at,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct DeletePayload {
    ids: Vec<u64>,
}

#[derive(Serialize, Deserialize)]
struct SequencePayload {
    next_id: u64,
}

struct QueueInner {
    log: RecordLog,
    entries: BTreeMap<u64, QueueEntry>,
    next_id: u64,
}

impl QueueInner {
    fn apply(&mut self, record: &LogRecord) -> StoreResult<()> {
        match record.kind {
            RecordKind::EntryPut => {
                let entry: QueueEntry = from_cbor(&record.payload)?;
                self.next_id = self.next_id.max(entry.id + 1);
                self.entries.insert(entry.id, entry);
            }
            RecordKind::EntryDelete => {
                let payload: DeletePayload = from_cbor(&record.payload)?;
                for id in payload.ids {
                    self.entries.remove(&id);
                }
            }
            RecordKind::Purge => self.entries.clear(),
            RecordKind::Sequence => {
                let payload: SequencePayload = from_cbor(&record.payload)?;
                self.next_id = self.next_id.max(payload.next_id);
            }
            RecordKind::StateSet | RecordKind::StateRemove => {
                return Err(StoreError::corruption(format!(
                    "state record at offset {} in a queue log",
                    record.offset
                )));
            }
        }
        Ok(())
    }

    /// Replaces a drained log with a single record holding the id sequence.
    ///
    /// The swap is atomic, so a failure leaves the full history (and with
    /// it the sequence) in place. Failures are logged and otherwise ignored.
    fn compact_if_drained(&mut self, partition: Partition) {
        if !self.entries.is_empty() || self.log.is_read_only() {
            return;
        }
        let compacted = to_cbor(&SequencePayload {
            next_id: self.next_id,
        })
        .map_err(StoreError::from)
        .and_then(|seq| self.log.rewrite(&[(RecordKind::Sequence, seq)]));

        match compacted {
            Ok(()) => {
                tracing::debug!(%partition, next_id = self.next_id, "compacted drained queue log");
            }
            Err(e) => {
                tracing::warn!(%partition, error = %e, "could not compact drained queue log");
            }
        }
    }
}

/// One durable, FIFO-ordered queue partition.
///
/// Internally synchronized; all methods take `&self`.
pub struct ActionQueue {
    partition: Partition,
    inner: Mutex<QueueInner>,
}

impl ActionQueue {
    /// Opens a partition over `backend`, replaying whatever it holds.
    pub fn open(partition: Partition, backend: Box<dyn StorageBackend>) -> StoreResult<Self> {
        let (log, records) = RecordLog::open(backend)?;
        Self::from_log(partition, log, &records)
    }

    /// Opens a partition for inspection. Every write fails with
    /// [`StoreError::ReadOnly`] and a torn tail is left in place.
    pub fn open_read_only(partition: Partition, backend: Box<dyn StorageBackend>) -> StoreResult<Self> {
        let (log, records) = RecordLog::open_read_only(backend)?;
        Self::from_log(partition, log, &records)
    }

    fn from_log(partition: Partition, log: RecordLog, records: &[LogRecord]) -> StoreResult<Self> {
        let mut inner = QueueInner {
            log,
            entries: BTreeMap::new(),
            next_id: 1,
        };
        for record in records {
            inner.apply(record)?;
        }

        tracing::debug!(
            %partition,
            records = records.len(),
            pending = inner.entries.len(),
            next_id = inner.next_id,
            "opened queue partition"
        );

        Ok(Self {
            partition,
            inner: Mutex::new(inner),
        })
    }

    /// Opens an empty partition held in memory.
    pub fn in_memory(partition: Partition) -> StoreResult<Self> {
        Self::open(partition, Box::new(InMemoryBackend::new()))
    }

    /// The partition this queue holds.
    pub fn partition(&self) -> Partition {
        self.partition
    }

    /// Appends an entry and returns its id.
    ///
    /// The record is flushed before this returns. On error nothing is
    /// queued and the id is not consumed.
    pub fn enqueue(&self, entry: NewEntry) -> StoreResult<u64> {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        let entry = entry.into_entry(id);
        let payload = to_cbor(&entry)?;

        inner.log.append(RecordKind::EntryPut, &payload)?;
        inner.next_id = id + 1;
        inner.entries.insert(id, entry);
        Ok(id)
    }

    /// Returns the oldest entries in id order without removing them.
    ///
    /// Stops at `max_items` or before the batch would exceed `max_bytes`
    /// of serialized entries. The first entry is always returned, even if
    /// it alone is larger than `max_bytes`.
    pub fn peek_batch(&self, max_items: usize, max_bytes: usize) -> StoreResult<Vec<QueueEntry>> {
        let inner = self.inner.lock();
        let mut batch = Vec::new();
        let mut bytes = 0usize;

        for entry in inner.entries.values() {
            if batch.len() >= max_items {
                break;
            }
            let len = entry.encoded_len()?;
            if !batch.is_empty() && bytes + len > max_bytes {
                break;
            }
            bytes += len;
            batch.push(entry.clone());
        }

        Ok(batch)
    }

    /// Deletes entries by id and returns how many were present.
    ///
    /// Absent ids are ignored, so deleting twice is the same as deleting once.
    pub fn delete(&self, ids: &[u64]) -> StoreResult<usize> {
        let mut inner = self.inner.lock();
        let mut present: Vec<u64> = ids
            .iter()
            .copied()
            .filter(|id| inner.entries.contains_key(id))
            .collect();
        present.sort_unstable();
        present.dedup();
        if present.is_empty() {
            return Ok(0);
        }

        let payload = to_cbor(&DeletePayload {
            ids: present.clone(),
        })?;
        inner.log.append(RecordKind::EntryDelete, &payload)?;
        for id in &present {
            inner.entries.remove(id);
        }
        inner.compact_if_drained(self.partition);
        Ok(present.len())
    }

    /// Drops every pending entry and returns how many were removed.
    ///
    /// Only full-sync supersession discards entries this way.
    pub fn purge(&self) -> StoreResult<usize> {
        let mut inner = self.inner.lock();
        let removed = inner.entries.len();
        if removed > 0 {
            inner.log.append(RecordKind::Purge, &[])?;
            inner.entries.clear();
        }
        inner.compact_if_drained(self.partition);
        Ok(removed)
    }

    /// Number of pending entries.
    pub fn size(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// The id the next enqueue will receive.
    pub fn next_id(&self) -> u64 {
        self.inner.lock().next_id
    }

    /// All pending entries in id order.
    pub fn entries(&self) -> Vec<QueueEntry> {
        self.inner.lock().entries.values().cloned().collect()
    }

    /// Capture time of the oldest pending entry.
    pub fn oldest_timestamp(&self) -> Option<u64> {
        self.inner
            .lock()
            .entries
            .values()
            .next()
            .map(|entry| entry.timestamp)
    }

    /// Digest over the pending entries whose ids fall in `range`.
    pub fn checksum(&self, range: RangeInclusive<u64>) -> StoreResult<String> {
        let inner = self.inner.lock();
        let mut digest = DigestBuilder::new();
        for entry in inner.entries.range(range).map(|(_, entry)| entry) {
            digest.update(entry)?;
        }
        Ok(digest.finish())
    }

    /// Digest over every pending entry, with the number of entries covered.
    pub fn checksum_all(&self) -> StoreResult<(String, u64)> {
        let inner = self.inner.lock();
        let mut digest = DigestBuilder::new();
        for entry in inner.entries.values() {
            digest.update(entry)?;
        }
        let items = digest.items();
        Ok((digest.finish(), items))
    }

    /// Size of the partition's log in bytes.
    pub fn log_size(&self) -> StoreResult<u64> {
        self.inner.lock().log.size()
    }

    /// Bytes of a torn record found at the end of the log on open.
    pub fn torn_bytes(&self) -> u64 {
        self.inner.lock().log.torn_bytes()
    }
}

impl std::fmt::Debug for ActionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ActionQueue")
            .field("partition", &self.partition)
            .field("pending", &inner.entries.len())
            .field("next_id", &inner.next_id)
            .finish()
    }
}

/// The regular and full-sync partitions together.
#[derive(Debug)]
pub struct SyncQueues {
    regular: ActionQueue,
    full_sync: ActionQueue,
}

impl SyncQueues {
    /// Wraps two opened partitions.
    pub fn new(regular: ActionQueue, full_sync: ActionQueue) -> StoreResult<Self> {
        if regular.partition() != Partition::Regular || full_sync.partition() != Partition::FullSync {
            return Err(StoreError::InvalidArgument(
                "queues passed in the wrong partition slots".into(),
            ));
        }
        Ok(Self { regular, full_sync })
    }

    /// Opens both partitions over the given backends.
    pub fn open(
        regular: Box<dyn StorageBackend>,
        full_sync: Box<dyn StorageBackend>,
    ) -> StoreResult<Self> {
        Ok(Self {
            regular: ActionQueue::open(Partition::Regular, regular)?,
            full_sync: ActionQueue::open(Partition::FullSync, full_sync)?,
        })
    }

    /// Opens both partitions read-only.
    pub fn open_read_only(
        regular: Box<dyn StorageBackend>,
        full_sync: Box<dyn StorageBackend>,
    ) -> StoreResult<Self> {
        Ok(Self {
            regular: ActionQueue::open_read_only(Partition::Regular, regular)?,
            full_sync: ActionQueue::open_read_only(Partition::FullSync, full_sync)?,
        })
    }

    /// Opens both partitions in memory.
    pub fn in_memory() -> StoreResult<Self> {
        Self::open(
            Box::new(InMemoryBackend::new()),
            Box::new(InMemoryBackend::new()),
        )
    }

    /// Returns one partition.
    pub fn partition(&self, partition: Partition) -> &ActionQueue {
        match partition {
            Partition::Regular => &self.regular,
            Partition::FullSync => &self.full_sync,
        }
    }

    /// Enqueues on a partition.
    pub fn enqueue(&self, partition: Partition, entry: NewEntry) -> StoreResult<u64> {
        self.partition(partition).enqueue(entry)
    }

    /// Peeks a batch from a partition.
    pub fn peek_batch(
        &self,
        partition: Partition,
        max_items: usize,
        max_bytes: usize,
    ) -> StoreResult<Vec<QueueEntry>> {
        self.partition(partition).peek_batch(max_items, max_bytes)
    }

    /// Deletes ids from a partition.
    pub fn delete(&self, partition: Partition, ids: &[u64]) -> StoreResult<usize> {
        self.partition(partition).delete(ids)
    }

    /// Pending entries in a partition.
    pub fn size(&self, partition: Partition) -> usize {
        self.partition(partition).size()
    }

    /// Digest over an id range of a partition.
    pub fn checksum(&self, partition: Partition, range: RangeInclusive<u64>) -> StoreResult<String> {
        self.partition(partition).checksum(range)
    }

    /// Purges a partition.
    pub fn purge(&self, partition: Partition) -> StoreResult<usize> {
        self.partition(partition).purge()
    }

    /// Pending entries across both partitions.
    pub fn total_size(&self) -> usize {
        self.regular.size() + self.full_sync.size()
    }
}
