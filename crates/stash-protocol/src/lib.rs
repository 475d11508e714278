//! Wire protocol between stash clients and the daemon.
//!
//! Defines the framing, message set, and serialization format spoken over
//! the unix domain socket. Payloads stream as chunk frames in both
//! directions, so neither side ever holds a whole secret in a single
//! message.

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;

pub use codec::Codec;
pub use error::{ProtocolError, ProtocolResult};
pub use frame::{read_frame, write_frame};
pub use message::{ErrorKind, Message, MAX_MESSAGE_SIZE, READY_MARKER};
