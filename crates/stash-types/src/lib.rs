//! Foundation types for stash.
//!
//! This crate provides the vocabulary shared by every other stash crate:
//! the content digest that identifies secret payloads, the metadata record
//! written for every revision, the head record that marks the current
//! revision of a name, and the selector a caller uses to address a
//! historical value.
//!
//! # Key Types
//!
//! - [`Digest`] — Content-addressed identifier (BLAKE3 hash of the payload)
//! - [`Hasher`] — Incremental digest computation for streamed payloads
//! - [`Metadata`] — Immutable per-revision record: digest, length, creation time
//! - [`HeadRecord`] — The mutable pointer from a name to its current revision
//! - [`Selector`] — Revision number or digest-prefix addressing for reads

pub mod digest;
pub mod error;
pub mod name;
pub mod record;

pub use digest::{Digest, Hasher, DIGEST_LEN};
pub use error::TypeError;
pub use name::validate_name;
pub use record::{HeadRecord, Metadata, Selector};

/// Fixed size of a content chunk, for both storage and wire transfer.
///
/// A payload of length `n` is stored as `ceil(n / CHUNK_SIZE)` chunks with
/// 1-based indices; only the final chunk may be shorter. The value is part
/// of the persisted layout and must not change once a store exists.
pub const CHUNK_SIZE: usize = 512 * 1024;

/// Upper bound on the byte length of a secret name.
pub const MAX_NAME_LEN: usize = 4096;
