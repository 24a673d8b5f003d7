//! Data directory layout.
//!
//! ```text
//! <data_dir>/
//! ├─ queue.regular.log     # regular partition
//! ├─ queue.full_sync.log   # full-sync partition
//! └─ state.log             # full-sync job, module activation
//! ```

use crate::error::{StoreError, StoreResult};
use crate::queue::{ActionQueue, SyncQueues};
use crate::state::StateStore;
use edgesync_protocol::Partition;
use edgesync_storage::{FileBackend, InMemoryBackend, StorageBackend};
use std::fs;
use std::path::{Path, PathBuf};

const STATE_FILE: &str = "state.log";

/// The on-disk home of one edge node's sync state.
#[derive(Debug, Clone)]
pub struct DataDir {
    path: PathBuf,
}

impl DataDir {
    /// Opens a data directory, creating it when `create_if_missing` is set.
    pub fn open(path: &Path, create_if_missing: bool) -> StoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path).map_err(edgesync_storage::StorageError::from)?;
            } else {
                return Err(StoreError::invalid_directory(format!(
                    "data directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(StoreError::invalid_directory(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Root path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Log file of one queue partition.
    #[must_use]
    pub fn queue_path(&self, partition: Partition) -> PathBuf {
        self.path.join(format!("queue.{}.log", partition.as_str()))
    }

    /// Log file of the state store.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.path.join(STATE_FILE)
    }

    /// Opens one queue partition.
    pub fn open_queue(&self, partition: Partition) -> StoreResult<ActionQueue> {
        let backend = FileBackend::open(&self.queue_path(partition))?;
        ActionQueue::open(partition, Box::new(backend))
    }

    /// Opens both queue partitions.
    pub fn open_queues(&self) -> StoreResult<SyncQueues> {
        SyncQueues::new(
            self.open_queue(Partition::Regular)?,
            self.open_queue(Partition::FullSync)?,
        )
    }

    /// Opens the state store.
    pub fn open_state(&self) -> StoreResult<StateStore> {
        let backend = FileBackend::open(&self.state_path())?;
        StateStore::open(Box::new(backend))
    }

    /// Opens one queue partition without modifying its file.
    pub fn open_queue_read_only(&self, partition: Partition) -> StoreResult<ActionQueue> {
        ActionQueue::open_read_only(partition, read_only_backend(&self.queue_path(partition))?)
    }

    /// Opens both queue partitions without modifying their files.
    pub fn open_queues_read_only(&self) -> StoreResult<SyncQueues> {
        SyncQueues::new(
            self.open_queue_read_only(Partition::Regular)?,
            self.open_queue_read_only(Partition::FullSync)?,
        )
    }

    /// Opens the state store without modifying its file.
    pub fn open_state_read_only(&self) -> StoreResult<StateStore> {
        StateStore::open_read_only(read_only_backend(&self.state_path())?)
    }
}

/// A missing log reads as empty and is not created.
fn read_only_backend(path: &Path) -> StoreResult<Box<dyn StorageBackend>> {
    if path.exists() {
        Ok(Box::new(FileBackend::open_read_only(path)?))
    } else {
        Ok(Box::new(InMemoryBackend::new()))
    }
}
