//! Error types for the sync engine.

use edgesync_codec::CodecError;
use edgesync_protocol::ProtocolError;
use edgesync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// None of these are fatal to the host. Transport failures and rejections
/// leave queued entries in place for the next attempt; a persistence
/// failure is returned to whoever emitted the mutation.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Writing to or reading from the local queue or state store failed.
    #[error("queue persistence error: {0}")]
    QueuePersistence(#[from] StoreError),

    /// Network or transport error reaching the remote.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The remote explicitly refused the payload.
    #[error("remote rejected payload: {0}")]
    RemoteRejection(String),

    /// A message could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A value could not be serialized.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A module name no registered module answers to.
    #[error("unknown module: {0}")]
    UnknownModule(String),

    /// A module that exists but is switched off was asked for by name.
    #[error("module is deactivated: {0}")]
    InactiveModule(String),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if a later attempt may succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::RemoteRejection(_) | SyncError::QueuePersistence(_) => true,
            _ => false,
        }
    }

    /// Returns true if the failure happened on the remote side of the link.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            SyncError::Transport { .. } | SyncError::RemoteRejection(_)
        )
    }
}
