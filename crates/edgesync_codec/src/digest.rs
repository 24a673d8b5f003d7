//! Canonical digests.
//!
//! A digest is SHA-256 over the CBOR encoding of each item, hex encoded.
//! Because [`crate::Value`] encodes deterministically, two nodes holding the
//! same rows compute the same digest regardless of map insertion order.

use crate::cbor::to_cbor;
use crate::error::CodecResult;
use serde::Serialize;
use sha2::{Digest as _, Sha256};

/// Length of a hex-encoded digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Incremental digest over a sequence of serializable items.
///
/// Each item is length-prefixed before hashing so that `["ab", "c"]` and
/// `["a", "bc"]` never collide.
#[derive(Clone, Default)]
pub struct DigestBuilder {
    hasher: Sha256,
    items: u64,
}

impl DigestBuilder {
    /// Creates an empty digest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one item.
    pub fn update<T: Serialize + ?Sized>(&mut self, item: &T) -> CodecResult<()> {
        let bytes = to_cbor(item)?;
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(&bytes);
        self.items += 1;
        Ok(())
    }

    /// Number of items fed so far.
    pub fn items(&self) -> u64 {
        self.items
    }

    /// Finishes and returns the lowercase hex digest.
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl std::fmt::Debug for DigestBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestBuilder")
            .field("items", &self.items)
            .finish_non_exhaustive()
    }
}

/// Digest of a single value.
pub fn canonical_digest<T: Serialize + ?Sized>(value: &T) -> CodecResult<String> {
    let mut builder = DigestBuilder::new();
    builder.update(value)?;
    Ok(builder.finish())
}

/// Digest of every item yielded by `items`.
pub fn digest_all<'a, T, I>(items: I) -> CodecResult<String>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut builder = DigestBuilder::new();
    for item in items {
        builder.update(item)?;
    }
    Ok(builder.finish())
}
