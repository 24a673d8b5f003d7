//! # EdgeSync Protocol
//!
//! Types shared by the queue, the sender and the remote endpoint:
//!
//! - [`QueueEntry`], [`Actor`] and [`Partition`]
//! - [`ChecksumRecord`] for drift detection
//! - the `syncActions` request envelope and [`RemoteReply`]
//! - the [`Codec`] trait with [`CborCodec`] and [`JsonCodec`]
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod entry;
mod error;
mod messages;

pub use codec::{CborCodec, Codec, CodecKind, JsonCodec};
pub use entry::{Actor, ChecksumRecord, Partition, QueueEntry};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    RemoteReply, ReplyEnvelope, SyncActionsRequest, CHECKSUM_QUEUE_ID, SYNC_ACTIONS_METHOD,
};
