//! Persisted key layout.
//!
//! All records live in one ordered byte keyspace under these namespaces:
//!
//! ```text
//! head:<name>                         -> HeadRecord
//! seq:<name>                          -> u64 (last allocated revision)
//! hist:<name>\0<rev be64>             -> Metadata
//! time:<name>\0<nanos be64><rev be64> -> Metadata
//! hash:<digest 32B>                   -> Metadata (first writer)
//! blob:<digest 32B><index be32>       -> chunk bytes
//! ```
//!
//! Integers are big-endian so byte order equals numeric order, which makes
//! range scans walk revisions (and timestamps) in numeric order. The NUL
//! after the name keeps one name's records out of another's prefix range;
//! names are validated to never contain NUL.

use stash_types::Digest;

const HEAD: &[u8] = b"head:";
const SEQ: &[u8] = b"seq:";
const HIST: &[u8] = b"hist:";
const TIME: &[u8] = b"time:";
const HASH: &[u8] = b"hash:";
const BLOB: &[u8] = b"blob:";

pub fn head(name: &str) -> Vec<u8> {
    [HEAD, name.as_bytes()].concat()
}

/// Prefix covering every head pointer; used by list.
pub fn head_prefix() -> Vec<u8> {
    HEAD.to_vec()
}

/// Recover the name from a `head:` key produced by [`head`].
pub fn head_name(key: &[u8]) -> Option<String> {
    let rest = key.strip_prefix(HEAD)?;
    String::from_utf8(rest.to_vec()).ok()
}

pub fn seq(name: &str) -> Vec<u8> {
    [SEQ, name.as_bytes()].concat()
}

pub fn hist(name: &str, revision: u64) -> Vec<u8> {
    let mut key = hist_prefix(name);
    key.extend_from_slice(&revision.to_be_bytes());
    key
}

/// Prefix covering every history record of `name`.
pub fn hist_prefix(name: &str) -> Vec<u8> {
    [HIST, name.as_bytes(), b"\0"].concat()
}

pub fn time(name: &str, nanos: u64, revision: u64) -> Vec<u8> {
    let mut key = time_prefix(name);
    key.extend_from_slice(&nanos.to_be_bytes());
    key.extend_from_slice(&revision.to_be_bytes());
    key
}

/// Prefix covering every creation-time index entry of `name`.
pub fn time_prefix(name: &str) -> Vec<u8> {
    [TIME, name.as_bytes(), b"\0"].concat()
}

pub fn hash(digest: &Digest) -> Vec<u8> {
    [HASH, digest.as_bytes().as_slice()].concat()
}

pub fn blob(digest: &Digest, index: u32) -> Vec<u8> {
    let mut key = [BLOB, digest.as_bytes().as_slice()].concat();
    key.extend_from_slice(&index.to_be_bytes());
    key
}
