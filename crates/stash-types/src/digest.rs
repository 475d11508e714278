use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Byte length of a [`Digest`].
pub const DIGEST_LEN: usize = 32;

/// Content-addressed identifier for a secret payload.
///
/// A `Digest` is the BLAKE3 hash of the payload bytes. Identical payloads
/// always produce the same `Digest`, independent of the name they are
/// stored under, which is what makes content deduplication work.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Compute the digest of a complete payload held in memory.
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Hex-encoded string representation (64 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters), for listings.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a full 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != DIGEST_LEN {
            return Err(TypeError::InvalidLength {
                expected: DIGEST_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; DIGEST_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Whether this digest's hex form starts with `prefix`.
    ///
    /// Matching is case-insensitive on the prefix, so selectors pasted from
    /// uppercase hex dumps still resolve.
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        self.to_hex().starts_with(&prefix.to_ascii_lowercase())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.short_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Incremental digest computation.
///
/// Streamed writes (a Set arriving chunk by chunk) feed each chunk through
/// `update` while the bytes are spooled, so the payload is read exactly
/// once.
#[derive(Default)]
pub struct Hasher {
    inner: blake3::Hasher,
    length: u64,
}

impl Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb the next run of payload bytes.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
        self.length += data.len() as u64;
    }

    /// Total number of bytes absorbed so far.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Finish the stream, producing the payload digest.
    pub fn finish(self) -> Digest {
        Digest(*self.inner.finalize().as_bytes())
    }
}
