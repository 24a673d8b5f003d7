//! Queue entries and the identifiers attached to them.

use crate::error::{ProtocolError, ProtocolResult};
use edgesync_codec::{to_cbor, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Who (or what) triggered a captured action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Actor {
    /// Local user id. `0` is the system itself (cron, CLI, full sync).
    pub user_id: u64,
}

impl Actor {
    /// The system actor.
    pub const SYSTEM: Actor = Actor { user_id: 0 };

    /// Creates an actor for a local user.
    pub const fn user(user_id: u64) -> Self {
        Self { user_id }
    }

    /// Returns true for the system actor.
    pub fn is_system(&self) -> bool {
        self.user_id == 0
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_system() {
            f.write_str("system")
        } else {
            write!(f, "user:{}", self.user_id)
        }
    }
}

/// One of the independently ordered sub-queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    /// Incremental per-event replication.
    Regular,
    /// Bulk re-enumeration produced by a full sync.
    FullSync,
}

impl Partition {
    /// Both partitions, in drain-priority order.
    pub const ALL: [Partition; 2] = [Partition::FullSync, Partition::Regular];

    /// Stable name, used as the `queue_id` on the wire and in file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Regular => "regular",
            Partition::FullSync => "full_sync",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Partition {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regular" => Ok(Partition::Regular),
            "full_sync" | "full-sync" => Ok(Partition::FullSync),
            other => Err(ProtocolError::UnknownPartition(other.to_string())),
        }
    }
}

/// A captured action waiting for transmission.
///
/// Entries are immutable once written. Ids are assigned by the queue
/// partition and increase monotonically within it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Sequence number within the partition.
    pub id: u64,
    /// Serialized action name, e.g. `update_option`.
    pub action_name: String,
    /// Action arguments, opaque to the engine.
    pub action_args: Vec<Value>,
    /// Who triggered the action.
    pub actor: Actor,
    /// When the action happened (Unix seconds).
    pub timestamp: u64,
    /// When the entry was written to the queue (Unix seconds).
    pub enqueued_at: u64,
}

impl QueueEntry {
    /// Serialized size used when capping batches by bytes.
    pub fn encoded_len(&self) -> ProtocolResult<usize> {
        Ok(to_cbor(self)?.len())
    }

    /// Returns the argument at `index`, if present.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.action_args.get(index)
    }
}

/// A digest of one tracked scope, produced by the checksum routine.
///
/// Transmitted and discarded; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumRecord {
    /// Table, category or partition the digest covers.
    pub scope: String,
    /// Hex-encoded SHA-256 digest.
    pub value: String,
    /// Number of rows that went into the digest.
    pub items: u64,
    /// When the digest was computed (Unix seconds).
    pub computed_at: u64,
}

impl ChecksumRecord {
    /// Converts the record to a dynamic value for use as an action argument.
    pub fn to_value(&self) -> Value {
        Value::map([
            ("scope", Value::from(self.scope.as_str())),
            ("value", Value::from(self.value.as_str())),
            ("items", Value::Integer(clamp_i64(self.items))),
            ("computed_at", Value::Integer(clamp_i64(self.computed_at))),
        ])
    }

    /// Reads a record back from [`ChecksumRecord::to_value`] output.
    pub fn from_value(value: &Value) -> ProtocolResult<Self> {
        let text = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_text)
                .map(str::to_string)
                .ok_or_else(|| ProtocolError::InvalidMessage(format!("checksum missing {name}")))
        };
        let number = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_integer)
                .and_then(|n| u64::try_from(n).ok())
                .ok_or_else(|| ProtocolError::InvalidMessage(format!("checksum missing {name}")))
        };

        Ok(Self {
            scope: text("scope")?,
            value: text("value")?,
            items: number("items")?,
            computed_at: number("computed_at")?,
        })
    }
}

pub(crate) fn clamp_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
