//! # EdgeSync Store
//!
//! Durable structures of an edge node, each a framed record log over an
//! `edgesync_storage` backend:
//!
//! - [`ActionQueue`] / [`SyncQueues`]: the regular and full-sync partitions
//! - [`StateStore`]: small serde documents (job progress, module state)
//! - [`DataDir`]: where the logs live on disk
//!
//! Nothing here survives in memory between invocations; every invocation
//! reopens and replays the logs.
//!
//! ```
//! use edgesync_codec::Value;
//! use edgesync_protocol::{Actor, Partition};
//! use edgesync_store::{NewEntry, SyncQueues};
//!
//! let queues = SyncQueues::in_memory().unwrap();
//! let id = queues
//!     .enqueue(
//!         Partition::Regular,
//!         NewEntry::new("update_option", vec![Value::from("blogname"), Value::from("Foo")], Actor::user(1), 0),
//!     )
//!     .unwrap();
//! assert_eq!(id, 1);
//! assert_eq!(queues.size(Partition::Regular), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod dir;
mod error;
#[cfg(test)]
mod fault;
mod queue;
pub mod record;
mod state;

pub use dir::DataDir;
pub use error::{StoreError, StoreResult};
pub use queue::{ActionQueue, NewEntry, SyncQueues};
pub use state::StateStore;
