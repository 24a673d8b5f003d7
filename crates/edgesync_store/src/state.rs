//! Durable key/value state.
//!
//! Holds small documents that must outlive an invocation: full-sync job
//! progress and feature-module activation. Values are CBOR; the last write
//! for a key wins on replay.

use crate::error::{StoreError, StoreResult};
use crate::record::{LogRecord, RecordKind, RecordLog};
use edgesync_codec::{from_cbor, to_cbor};
use edgesync_storage::{InMemoryBackend, StorageBackend};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize)]
struct SetPayload {
    key: String,
    value: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct RemovePayload {
    key: String,
}

struct StateInner {
    log: RecordLog,
    values: BTreeMap<String, Vec<u8>>,
    records: usize,
}

/// A durable map from string keys to serde values.
pub struct StateStore {
    inner: Mutex<StateInner>,
}

impl StateStore {
    /// Opens a store over `backend`, replaying whatever it holds.
    pub fn open(backend: Box<dyn StorageBackend>) -> StoreResult<Self> {
        let (log, records) = RecordLog::open(backend)?;
        Self::from_log(log, &records)
    }

    /// Opens a store whose writes fail with [`StoreError::ReadOnly`].
    pub fn open_read_only(backend: Box<dyn StorageBackend>) -> StoreResult<Self> {
        let (log, records) = RecordLog::open_read_only(backend)?;
        Self::from_log(log, &records)
    }

    fn from_log(log: RecordLog, records: &[LogRecord]) -> StoreResult<Self> {
        let mut values = BTreeMap::new();

        for record in records {
            match record.kind {
                RecordKind::StateSet => {
                    let payload: SetPayload = from_cbor(&record.payload)?;
                    values.insert(payload.key, payload.value);
                }
                RecordKind::StateRemove => {
                    let payload: RemovePayload = from_cbor(&record.payload)?;
                    values.remove(&payload.key);
                }
                other => {
                    return Err(StoreError::corruption(format!(
                        "{other:?} record at offset {} in a state log",
                        record.offset
                    )));
                }
            }
        }

        Ok(Self {
            inner: Mutex::new(StateInner {
                log,
                values,
                records: records.len(),
            }),
        })
    }

    /// Opens an empty store held in memory.
    pub fn in_memory() -> StoreResult<Self> {
        Self::open(Box::new(InMemoryBackend::new()))
    }

    /// Reads and decodes a value.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        let inner = self.inner.lock();
        match inner.values.get(key) {
            Some(bytes) => Ok(Some(from_cbor(bytes)?)),
            None => Ok(None),
        }
    }

    /// Encodes and writes a value. Flushed before returning.
    pub fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StoreResult<()> {
        let bytes = to_cbor(value)?;
        let mut inner = self.inner.lock();
        if inner.values.get(key) == Some(&bytes) {
            return Ok(());
        }

        let payload = to_cbor(&SetPayload {
            key: key.to_string(),
            value: bytes.clone(),
        })?;
        inner.log.append(RecordKind::StateSet, &payload)?;
        inner.values.insert(key.to_string(), bytes);
        inner.records += 1;
        Ok(())
    }

    /// Removes a key. Returns true if it was present.
    pub fn remove(&self, key: &str) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        if !inner.values.contains_key(key) {
            return Ok(false);
        }
        let payload = to_cbor(&RemovePayload {
            key: key.to_string(),
        })?;
        inner.log.append(RecordKind::StateRemove, &payload)?;
        inner.values.remove(key);
        inner.records += 1;
        Ok(true)
    }

    /// Returns true if the key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().values.contains_key(key)
    }

    /// All keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().values.keys().cloned().collect()
    }

    /// Number of records in the log, including superseded ones.
    pub fn record_count(&self) -> usize {
        self.inner.lock().records
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("StateStore")
            .field("keys", &inner.values.len())
            .field("records", &inner.records)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Progress {
        module: String,
        cursor: u64,
    }

    #[test]
    fn put_get_remove() {
        let store = StateStore::in_memory().unwrap();
        assert_eq!(store.get::<Progress>("job").unwrap(), None);

        let progress = Progress {
            module: "posts".into(),
            cursor: 40,
        };
        store.put("job", &progress).unwrap();
        assert_eq!(store.get::<Progress>("job").unwrap(), Some(progress));
        assert!(store.contains("job"));

        assert!(store.remove("job").unwrap());
        assert!(!store.remove("job").unwrap());
        assert_eq!(store.get::<Progress>("job").unwrap(), None);
    }

    #[test]
    fn last_write_wins_after_reopen() {
        let backend = InMemoryBackend::new();
        {
            let store = StateStore::open(Box::new(backend.clone())).unwrap();
            store.put("module.options", &true).unwrap();
            store.put("module.posts", &true).unwrap();
            store.put("module.options", &false).unwrap();
            store.remove("module.posts").unwrap();
        }

        let store = StateStore::open(Box::new(backend)).unwrap();
        assert_eq!(store.get::<bool>("module.options").unwrap(), Some(false));
        assert_eq!(store.get::<bool>("module.posts").unwrap(), None);
        assert_eq!(store.keys(), vec!["module.options".to_string()]);
        assert_eq!(store.record_count(), 4);
    }

    #[test]
    fn unchanged_values_are_not_rewritten() {
        let store = StateStore::in_memory().unwrap();
        store.put("k", &1u32).unwrap();
        store.put("k", &1u32).unwrap();
        assert_eq!(store.record_count(), 1);
    }

    #[test]
    fn wrong_type_is_a_codec_error() {
        let store = StateStore::in_memory().unwrap();
        store.put("k", "text").unwrap();
        assert!(matches!(store.get::<u64>("k"), Err(StoreError::Codec(_))));
    }

    #[test]
    fn write_failures_leave_old_value() {
        let backend = InMemoryBackend::new();
        let store = StateStore::open(Box::new(backend.clone())).unwrap();
        store.put("k", &1u32).unwrap();

        backend.set_fail_writes(true);
        assert!(store.put("k", &2u32).is_err());
        assert_eq!(store.get::<u32>("k").unwrap(), Some(1));
    }

    #[test]
    fn read_only_store_refuses_writes() {
        let backend = InMemoryBackend::new();
        StateStore::open(Box::new(backend.clone()))
            .unwrap()
            .put("module.posts.active", &false)
            .unwrap();

        let store = StateStore::open_read_only(Box::new(backend)).unwrap();
        assert_eq!(store.get::<bool>("module.posts.active").unwrap(), Some(false));
        assert!(matches!(store.put("k", &1u32), Err(StoreError::ReadOnly)));
        assert!(!store.contains("k"));
    }
}
