use stash_protocol::{ErrorKind, ProtocolError};
use thiserror::Error;

/// Errors surfaced to callers of the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No daemon was listening and one could not be brought up.
    #[error("failed to start daemon: {0}")]
    DaemonStart(String),

    /// The daemon reported a failure for this request. The connection
    /// remains usable.
    #[error("{kind}: {message}")]
    Remote { kind: ErrorKind, message: String },

    /// Wire-level failure; the connection should be abandoned.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// I/O error on the socket or a local stream.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// The remote error kind, when the daemon rejected the request.
    pub fn remote_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Remote { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
