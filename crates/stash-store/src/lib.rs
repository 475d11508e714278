//! Revisioned, content-addressed secret storage.
//!
//! Every `set` of a name creates a new immutable revision; the payload is
//! split into fixed-size chunks stored under its BLAKE3 digest, so storing
//! the same bytes twice (under any name) costs nothing the second time. A
//! per-name head pointer selects the current revision, history is never
//! rewritten, and `delete` only drops the pointer.
//!
//! # Key Types
//!
//! - [`SecretStore`] -- the facade every caller goes through
//! - [`Spool`] / [`SealedSpool`] -- staging for streamed writes: bytes are
//!   appended (and hashed) as they arrive, then committed in one
//!   transaction
//! - [`StoreOptions`] -- policy knobs (`deny_empty`)
//!
//! # Transactional Shape
//!
//! A commit writes the history record, the creation-time index entry, the
//! content chunks (first writer only), and the head pointer atomically.
//! Readers run on MVCC snapshots and never block a writer. No transaction
//! is held while payload bytes travel a socket: writes stage into a spool
//! first, and streamed reads fetch one chunk per snapshot, which is safe
//! because content is immutable and never garbage-collected.

pub mod error;
pub mod keys;
pub mod spool;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use spool::{SealedSpool, Spool};
pub use store::{SecretStore, StoreOptions};
