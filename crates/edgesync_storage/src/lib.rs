//! # EdgeSync Storage
//!
//! Append-only byte stores underneath the EdgeSync action queue and state
//! store.
//!
//! Backends know nothing about queue entries or record framing. They append
//! bytes, read them back, and truncate when a log is compacted. Everything
//! above that (record envelopes, replay, compaction policy) lives in
//! `edgesync_store`.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - tests and ephemeral edge nodes
//! - [`FileBackend`] - durable logs that survive between invocations
//!
//! ## Example
//!
//! ```rust
//! use edgesync_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.append(b"entry-1").unwrap();
//! backend.append(b"entry-2").unwrap();
//! assert_eq!(backend.read_all().unwrap(), b"entry-1entry-2");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
