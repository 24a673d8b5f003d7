//! Batch codecs.
//!
//! A codec turns a batch of queue entries into the transport payload. The
//! codec's name travels with every transmission so the remote side can pick
//! the matching decoder; there is no runtime negotiation.

use crate::entry::QueueEntry;
use crate::error::{ProtocolError, ProtocolResult};
use edgesync_codec::{from_cbor, from_json, to_cbor, to_json};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Encode/decode strategy for transport payloads.
pub trait Codec: Send + Sync {
    /// Name sent alongside every payload, e.g. `cbor-v1`.
    fn name(&self) -> &'static str;

    /// Encodes a batch.
    fn encode(&self, entries: &[QueueEntry]) -> ProtocolResult<Vec<u8>>;

    /// Decodes a batch. Used for verification and tooling.
    ///
    /// Fails if the payload is not a sequence of entries.
    fn decode(&self, payload: &[u8]) -> ProtocolResult<Vec<QueueEntry>>;
}

/// Compact binary codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

impl Codec for CborCodec {
    fn name(&self) -> &'static str {
        CodecKind::Cbor.name()
    }

    fn encode(&self, entries: &[QueueEntry]) -> ProtocolResult<Vec<u8>> {
        Ok(to_cbor(entries)?)
    }

    fn decode(&self, payload: &[u8]) -> ProtocolResult<Vec<QueueEntry>> {
        Ok(from_cbor(payload)?)
    }
}

/// Plain JSON codec, readable on the wire.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        CodecKind::Json.name()
    }

    fn encode(&self, entries: &[QueueEntry]) -> ProtocolResult<Vec<u8>> {
        Ok(to_json(entries)?)
    }

    fn decode(&self, payload: &[u8]) -> ProtocolResult<Vec<QueueEntry>> {
        Ok(from_json(payload)?)
    }
}

/// Configured codec selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// [`CborCodec`].
    #[default]
    Cbor,
    /// [`JsonCodec`].
    Json,
}

impl CodecKind {
    /// Wire name of the codec.
    pub fn name(&self) -> &'static str {
        match self {
            CodecKind::Cbor => "cbor-v1",
            CodecKind::Json => "json-v1",
        }
    }

    /// Builds the codec.
    pub fn build(&self) -> Box<dyn Codec> {
        match self {
            CodecKind::Cbor => Box::new(CborCodec),
            CodecKind::Json => Box::new(JsonCodec),
        }
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CodecKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cbor" | "cbor-v1" => Ok(CodecKind::Cbor),
            "json" | "json-v1" => Ok(CodecKind::Json),
            other => Err(ProtocolError::UnknownCodec(other.to_string())),
        }
    }
}
