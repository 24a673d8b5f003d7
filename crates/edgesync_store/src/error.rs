//! Error types for the queue and state store.

use edgesync_codec::CodecError;
use edgesync_protocol::ProtocolError;
use edgesync_storage::StorageError;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading or writing durable logs.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend I/O failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A record payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// An entry could not be measured or encoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The log holds bytes that are not a valid record.
    #[error("log corruption: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },

    /// The data directory is missing or not a directory.
    #[error("invalid data directory: {message}")]
    InvalidDirectory {
        /// What is wrong with it.
        message: String,
    },

    /// A write was attempted on a log opened read-only.
    #[error("log opened read-only")]
    ReadOnly,

    /// A caller passed an argument the store cannot honor.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl StoreError {
    /// Creates a corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Creates an invalid directory error.
    pub fn invalid_directory(message: impl Into<String>) -> Self {
        Self::InvalidDirectory {
            message: message.into(),
        }
    }

    /// Returns true if this error came from the backend refusing or failing a write.
    pub fn is_storage(&self) -> bool {
        matches!(self, StoreError::Storage(_))
    }
}
