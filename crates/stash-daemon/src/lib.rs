//! Unix socket daemon serving the stash secret store.
//!
//! One daemon owns one store directory; the keyspace's exclusive file lock
//! makes a second instance fail fast. Clients connect over a unix domain
//! socket and speak the framed stash protocol; the first client usually
//! spawns the daemon itself and waits for its readiness line.
//!
//! # Lifecycle
//!
//! starting (open store, bind socket) -> listening (accept loop, one task
//! per connection) -> draining (stop accepting, let in-flight exchanges
//! finish) -> stopped (socket unlinked). SIGINT, SIGTERM and SIGHUP all
//! begin the drain.
//!
//! Logs go to stderr; stdout carries exactly one readiness line so a
//! parent process can tell when the socket is accepting.

pub mod config;
pub mod error;
pub mod handler;
pub mod server;

pub use config::DaemonConfig;
pub use error::{DaemonError, DaemonResult};
pub use server::Daemon;
