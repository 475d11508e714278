//! Ordered byte keyspace for the stash secret store.
//!
//! This crate wraps `redb` in the one storage abstraction the rest of stash
//! talks to: a single flat table of byte keys and byte values with ordered
//! prefix iteration. Higher layers encode their namespaces (`head:`,
//! `hist:`, `blob:`, ...) into the keys; this crate never interprets them.
//!
//! # Key Types
//!
//! - [`Keyspace`] -- an open database; cheap to share behind `Arc`
//! - [`Snapshot`] -- a consistent read view (redb MVCC read transaction)
//! - [`WriteAccess`] -- mutation handle passed to [`Keyspace::write`]
//!   closures; the whole closure commits atomically or not at all
//!
//! # Concurrency
//!
//! redb allows any number of concurrent snapshots against a single
//! serialized writer. The database file is exclusively locked on open, so a
//! second process opening the same store directory fails fast; the daemon
//! relies on this as its single-instance guard.

pub mod error;
pub mod keyspace;

pub use error::{KvError, KvResult};
pub use keyspace::{Keyspace, Snapshot, WriteAccess};
