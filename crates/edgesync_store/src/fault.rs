//! Backend wrapper that injects partial and refused writes.

use edgesync_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};
use parking_lot::Mutex;
use std::sync::Arc;

/// Faults to inject on the next writes.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Faults {
    /// Appends write half of their bytes, then fail.
    pub torn_appends: bool,
    /// Truncates fail.
    pub refuse_truncate: bool,
    /// Replaces fail.
    pub refuse_replace: bool,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FaultyBackend {
    inner: InMemoryBackend,
    faults: Arc<Mutex<Faults>>,
}

impl FaultyBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&self, faults: Faults) {
        *self.faults.lock() = faults;
    }

    fn faults(&self) -> Faults {
        *self.faults.lock()
    }
}

impl StorageBackend for FaultyBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        if self.faults().torn_appends {
            self.inner.append(&data[..data.len() / 2])?;
            return Err(StorageError::WriteRefused("torn write".into()));
        }
        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        if self.faults().refuse_truncate {
            return Err(StorageError::WriteRefused("truncate refused".into()));
        }
        self.inner.truncate(new_size)
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        if self.faults().refuse_replace {
            return Err(StorageError::WriteRefused("replace refused".into()));
        }
        self.inner.replace(data)
    }
}
