//! Error types for the protocol crate.

use edgesync_codec::CodecError;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding protocol messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Underlying serialization failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A message decoded but is missing fields or has the wrong shape.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A codec name that no implementation answers to.
    #[error("unknown codec: {0}")]
    UnknownCodec(String),

    /// A partition name other than `regular` or `full_sync`.
    #[error("unknown partition: {0}")]
    UnknownPartition(String),
}
