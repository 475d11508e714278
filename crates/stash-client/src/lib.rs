//! Client side of the stash protocol.
//!
//! # Key Types
//!
//! - [`Client`]: a typed connection to a running daemon, one method per
//!   request.
//! - [`Dialer`]: connects to the daemon socket, spawning a daemon first
//!   when nothing is listening.
//! - [`ClientError`]: local failures plus [`ClientError::Remote`] for
//!   errors the daemon reported in-band.

pub mod client;
pub mod dialer;
pub mod error;

pub use client::Client;
pub use dialer::Dialer;
pub use error::{ClientError, ClientResult};
