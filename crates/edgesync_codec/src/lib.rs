//! # EdgeSync Codec
//!
//! The dynamic [`Value`] type used for queue entry arguments, serde helpers
//! for CBOR (`ciborium`) and JSON (`serde_json`), and canonical SHA-256
//! digests used by checksum transmission.
//!
//! ## Usage
//!
//! ```
//! use edgesync_codec::{canonical_digest, from_cbor, to_cbor, Value};
//!
//! let value = Value::Array(vec![Value::from("blogname"), Value::from("Foo")]);
//! let bytes = to_cbor(&value).unwrap();
//! let decoded: Value = from_cbor(&bytes).unwrap();
//! assert_eq!(value, decoded);
//! assert_eq!(canonical_digest(&value).unwrap().len(), 64);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod digest;
mod error;
mod json;
mod value;

pub use cbor::{from_cbor, to_cbor};
pub use digest::{canonical_digest, digest_all, DigestBuilder, DIGEST_HEX_LEN};
pub use error::{CodecError, CodecResult};
pub use json::{from_json, to_json, to_json_pretty};
pub use value::{Value, BYTES_KEY};
