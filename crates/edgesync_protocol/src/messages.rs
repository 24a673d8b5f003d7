//! Wire envelopes exchanged with the remote endpoint.

use crate::entry::clamp_i64;
use crate::error::{ProtocolError, ProtocolResult};
use edgesync_codec::{from_cbor, to_cbor, Value};
use std::collections::BTreeMap;

/// RPC method name every batch is sent under.
pub const SYNC_ACTIONS_METHOD: &str = "syncActions";

/// Queue id used for checksum transmissions.
pub const CHECKSUM_QUEUE_ID: &str = "checksum";

/// A batch transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncActionsRequest {
    /// Always [`SYNC_ACTIONS_METHOD`].
    pub method: String,
    /// Codec-encoded batch of entries.
    pub payload: Vec<u8>,
    /// Name of the codec that produced `payload`.
    pub codec_name: String,
    /// When the batch left this node (Unix seconds).
    pub sent_timestamp: u64,
    /// Source partition name, or [`CHECKSUM_QUEUE_ID`].
    pub queue_id: String,
}

impl SyncActionsRequest {
    /// Creates a request for the `syncActions` method.
    pub fn new(
        payload: Vec<u8>,
        codec_name: impl Into<String>,
        sent_timestamp: u64,
        queue_id: impl Into<String>,
    ) -> Self {
        Self {
            method: SYNC_ACTIONS_METHOD.to_string(),
            payload,
            codec_name: codec_name.into(),
            sent_timestamp,
            queue_id: queue_id.into(),
        }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let envelope = Value::map([
            ("method", Value::from(self.method.as_str())),
            ("payload", Value::Bytes(self.payload.clone())),
            ("codec_name", Value::from(self.codec_name.as_str())),
            ("sent_timestamp", Value::Integer(clamp_i64(self.sent_timestamp))),
            ("queue_id", Value::from(self.queue_id.as_str())),
        ]);
        Ok(to_cbor(&envelope)?)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let value: Value = from_cbor(bytes)?;
        let map = expect_map(&value)?;

        Ok(Self {
            method: text_field(map, "method")?,
            payload: map
                .get("payload")
                .and_then(Value::as_bytes)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| missing("payload"))?,
            codec_name: text_field(map, "codec_name")?,
            sent_timestamp: u64_field(map, "sent_timestamp")?,
            queue_id: text_field(map, "queue_id")?,
        })
    }
}

/// Successful outcomes of a transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteReply {
    /// The whole batch was accepted.
    Ack,
    /// Only these entry ids were processed; the rest stay queued.
    Processed(Vec<u64>),
    /// Nothing was processed; do not send again before `at` (Unix seconds).
    RetryAfter {
        /// Earliest time of the next attempt.
        at: u64,
    },
}

/// Everything the remote side can answer, including an explicit rejection.
///
/// Rejections are carried separately so adapters can map them onto their own
/// error type while [`RemoteReply`] stays limited to non-error outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyEnvelope {
    /// A non-error outcome.
    Reply(RemoteReply),
    /// The remote refused the payload.
    Rejected {
        /// Human-readable reason.
        reason: String,
    },
}

impl ReplyEnvelope {
    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut map = BTreeMap::new();
        match self {
            ReplyEnvelope::Reply(RemoteReply::Ack) => {
                map.insert("status".to_string(), Value::from("ack"));
            }
            ReplyEnvelope::Reply(RemoteReply::Processed(ids)) => {
                map.insert("status".to_string(), Value::from("processed"));
                map.insert(
                    "ids".to_string(),
                    Value::Array(ids.iter().map(|id| Value::Integer(clamp_i64(*id))).collect()),
                );
            }
            ReplyEnvelope::Reply(RemoteReply::RetryAfter { at }) => {
                map.insert("status".to_string(), Value::from("retry_after"));
                map.insert("at".to_string(), Value::Integer(clamp_i64(*at)));
            }
            ReplyEnvelope::Rejected { reason } => {
                map.insert("status".to_string(), Value::from("rejected"));
                map.insert("reason".to_string(), Value::from(reason.as_str()));
            }
        }
        Ok(to_cbor(&Value::Map(map))?)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let value: Value = from_cbor(bytes)?;
        let map = expect_map(&value)?;

        match text_field(map, "status")?.as_str() {
            "ack" => Ok(ReplyEnvelope::Reply(RemoteReply::Ack)),
            "processed" => {
                let ids = map
                    .get("ids")
                    .and_then(Value::as_array)
                    .ok_or_else(|| missing("ids"))?
                    .iter()
                    .map(|v| {
                        v.as_integer()
                            .and_then(|n| u64::try_from(n).ok())
                            .ok_or_else(|| {
                                ProtocolError::InvalidMessage(format!("bad entry id: {v}"))
                            })
                    })
                    .collect::<ProtocolResult<Vec<u64>>>()?;
                Ok(ReplyEnvelope::Reply(RemoteReply::Processed(ids)))
            }
            "retry_after" => Ok(ReplyEnvelope::Reply(RemoteReply::RetryAfter {
                at: u64_field(map, "at")?,
            })),
            "rejected" => Ok(ReplyEnvelope::Rejected {
                reason: map
                    .get("reason")
                    .and_then(Value::as_text)
                    .unwrap_or("rejected")
                    .to_string(),
            }),
            other => Err(ProtocolError::InvalidMessage(format!(
                "unknown reply status: {other}"
            ))),
        }
    }
}

impl From<RemoteReply> for ReplyEnvelope {
    fn from(reply: RemoteReply) -> Self {
        ReplyEnvelope::Reply(reply)
    }
}

fn expect_map(value: &Value) -> ProtocolResult<&BTreeMap<String, Value>> {
    value
        .as_map()
        .ok_or_else(|| ProtocolError::InvalidMessage(format!("expected map, got {}", value.kind())))
}

fn missing(name: &str) -> ProtocolError {
    ProtocolError::InvalidMessage(format!("missing {name}"))
}

fn text_field(map: &BTreeMap<String, Value>, name: &str) -> ProtocolResult<String> {
    map.get(name)
        .and_then(Value::as_text)
        .map(str::to_string)
        .ok_or_else(|| missing(name))
}

fn u64_field(map: &BTreeMap<String, Value>, name: &str) -> ProtocolResult<u64> {
    map.get(name)
        .and_then(Value::as_integer)
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| missing(name))
}
