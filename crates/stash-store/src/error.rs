use stash_types::TypeError;
use thiserror::Error;

/// Errors from secret store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested name, revision, digest or chunk does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A digest prefix matched more than one distinct digest in the
    /// name's history.
    #[error("ambiguous selector {selector:?} for {name}: matches {count} digests")]
    AmbiguousSelector {
        name: String,
        selector: String,
        count: usize,
    },

    /// The request itself is invalid (bad name, denied empty payload).
    #[error("validation error: {0}")]
    Validation(String),

    /// A record failed to serialize.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored record cannot be decoded, or the store's invariants do not
    /// hold (a head pointing at a missing history record, content bytes
    /// that no longer match their digest).
    #[error("corrupt store: {0}")]
    Corrupt(String),

    /// Failure in the underlying keyspace.
    #[error("storage error: {0}")]
    Kv(#[from] stash_kv::KvError),

    /// I/O error outside the keyspace (spool staging).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TypeError> for StoreError {
    fn from(err: TypeError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
