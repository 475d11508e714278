use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    /// The socket could not be bound, including the case where a live
    /// daemon already serves it.
    #[error("failed to bind {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("store error: {0}")]
    Store(#[from] stash_store::StoreError),

    #[error("protocol error: {0}")]
    Protocol(#[from] stash_protocol::ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DaemonResult<T> = Result<T, DaemonError>;
