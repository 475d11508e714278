use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::Digest;

/// Metadata describing one revision of a named secret.
///
/// This is what listings and history queries return, and what Get resolves
/// before streaming chunks. The payload itself lives in content-addressed
/// blob storage keyed by `digest`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Name the secret is stored under.
    pub name: String,
    /// Revision number (1-based, monotonic per name).
    pub revision: u64,
    /// BLAKE3 digest of the payload bytes.
    pub digest: Digest,
    /// Payload length in bytes. Zero marks a tombstone.
    pub length: u64,
    /// When this revision was written.
    pub created_at: DateTime<Utc>,
}

impl Metadata {
    /// Whether this revision is a tombstone (zero-length payload).
    pub fn is_tombstone(&self) -> bool {
        self.length == 0
    }

    /// Number of fixed-size chunks the payload occupies.
    pub fn chunk_count(&self, chunk_size: usize) -> u32 {
        (self.length.div_ceil(chunk_size as u64)) as u32
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} r{} [{}] {}B",
            self.name,
            self.revision,
            self.digest.short_hex(),
            self.length
        )
    }
}

/// Current head of a name: the revision a bare Get resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadRecord {
    /// Revision the head points at.
    pub revision: u64,
    /// Digest of that revision's payload.
    pub digest: Digest,
}

/// Selects a specific revision of a name instead of its head.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selector {
    /// Exact revision number.
    Revision(u64),
    /// Hex prefix of a payload digest. Must match exactly one distinct
    /// digest in the name's history.
    Digest(String),
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Revision(rev) => write!(f, "r{rev}"),
            Self::Digest(prefix) => write!(f, "{prefix}"),
        }
    }
}
