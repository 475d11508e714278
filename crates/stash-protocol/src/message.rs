use std::fmt;

use serde::{Deserialize, Serialize};
use stash_types::{Metadata, Selector, CHUNK_SIZE};

/// Maximum bincode payload of a single frame: one content chunk plus
/// headroom for the envelope (names, metadata).
pub const MAX_MESSAGE_SIZE: usize = CHUNK_SIZE + 64 * 1024;

/// Marker inside the daemon's readiness line on stdout. The dialer scans
/// a spawned daemon's stdout for it before retrying the connection.
pub const READY_MARKER: &str = "listening on ";

/// All message types in the stash protocol.
///
/// Requests travel client to daemon, the rest daemon to client; `Chunk`
/// carries payload bytes in both directions. A `Set` exchange is
/// `Set`, zero or more `Chunk`s, then `SetDone`; a connection that drops
/// before `SetDone` is an abort and commits nothing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Message {
    // Requests.
    List { all: bool },
    Get { name: String, selector: Option<Selector> },
    Set { name: String },
    Chunk { data: Vec<u8> },
    SetDone,
    Log { name: String, limit: u64 },
    Del { name: String },
    Revert { name: String, revision: u64 },

    // Responses.
    Entry { meta: Metadata },
    Done { meta: Option<Metadata> },
    Error { kind: ErrorKind, message: String },
}

impl Message {
    pub fn type_tag(&self) -> u8 {
        match self {
            Self::List { .. } => 1,
            Self::Get { .. } => 2,
            Self::Set { .. } => 3,
            Self::Chunk { .. } => 4,
            Self::SetDone => 5,
            Self::Log { .. } => 6,
            Self::Del { .. } => 7,
            Self::Revert { .. } => 8,
            Self::Entry { .. } => 9,
            Self::Done { .. } => 10,
            Self::Error { .. } => 255,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::List { .. } => "List",
            Self::Get { .. } => "Get",
            Self::Set { .. } => "Set",
            Self::Chunk { .. } => "Chunk",
            Self::SetDone => "SetDone",
            Self::Log { .. } => "Log",
            Self::Del { .. } => "Del",
            Self::Revert { .. } => "Revert",
            Self::Entry { .. } => "Entry",
            Self::Done { .. } => "Done",
            Self::Error { .. } => "Error",
        }
    }
}

/// Failure category carried by [`Message::Error`] frames.
///
/// Clients re-raise the category unchanged, so a daemon-side `NotFound`
/// stays a not-found at the CLI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    AmbiguousSelector,
    Validation,
    Storage,
    Protocol,
    DaemonStart,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::AmbiguousSelector => write!(f, "ambiguous selector"),
            Self::Validation => write!(f, "validation error"),
            Self::Storage => write!(f, "storage error"),
            Self::Protocol => write!(f, "protocol error"),
            Self::DaemonStart => write!(f, "daemon start failed"),
        }
    }
}
