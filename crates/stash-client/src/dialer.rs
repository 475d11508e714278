//! Connect-or-spawn bootstrap for the daemon.
//!
//! The first stash command on a quiet machine finds no daemon. The
//! dialer tries the socket, and on failure launches the daemon (the
//! current executable with the `daemon` subcommand), waits for the
//! readiness line on the child's stdout, then retries the connection
//! exactly once. The child is put in its own process group and outlives
//! the CLI invocation that spawned it.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use stash_protocol::READY_MARKER;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::UnixStream;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::client::Client;
use crate::error::{ClientError, ClientResult};

/// How long a freshly spawned daemon gets to report readiness.
pub const DEFAULT_SPAWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Connects to the daemon socket, starting a daemon if needed.
pub struct Dialer {
    store_dir: PathBuf,
    socket_path: PathBuf,
    program: Option<PathBuf>,
    spawn_timeout: Duration,
}

impl Dialer {
    pub fn new(store_dir: impl Into<PathBuf>, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            store_dir: store_dir.into(),
            socket_path: socket_path.into(),
            program: None,
            spawn_timeout: DEFAULT_SPAWN_TIMEOUT,
        }
    }

    /// Launch `program` instead of the current executable.
    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn spawn_timeout(mut self, spawn_timeout: Duration) -> Self {
        self.spawn_timeout = spawn_timeout;
        self
    }

    /// Connect, spawning a daemon when nothing listens on the socket.
    pub async fn connect(&self) -> ClientResult<Client> {
        match UnixStream::connect(&self.socket_path).await {
            Ok(stream) => return Ok(Client::from_stream(stream)),
            Err(err) => {
                debug!(
                    socket = %self.socket_path.display(),
                    error = %err,
                    "no daemon listening, spawning one"
                );
            }
        }

        self.spawn_daemon().await?;

        // The readiness line is printed after the daemon has bound the
        // socket, so a single retry suffices.
        match UnixStream::connect(&self.socket_path).await {
            Ok(stream) => Ok(Client::from_stream(stream)),
            Err(err) => Err(ClientError::DaemonStart(format!(
                "daemon reported ready but {} refused the connection: {err}",
                self.socket_path.display()
            ))),
        }
    }

    async fn spawn_daemon(&self) -> ClientResult<()> {
        let program = match &self.program {
            Some(path) => path.clone(),
            None => std::env::current_exe()
                .map_err(|err| ClientError::DaemonStart(format!("cannot locate executable: {err}")))?,
        };

        let mut child = Command::new(&program)
            .arg("daemon")
            .arg("--store")
            .arg(&self.store_dir)
            .arg("--socket")
            .arg(&self.socket_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .process_group(0)
            .spawn()
            .map_err(|err| {
                ClientError::DaemonStart(format!("failed to spawn {}: {err}", program.display()))
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            ClientError::DaemonStart("daemon stdout was not captured".to_string())
        })?;

        match timeout(self.spawn_timeout, wait_for_ready(stdout)).await {
            Ok(Ok(())) => {
                info!(socket = %self.socket_path.display(), "daemon started");
                Ok(())
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(ClientError::DaemonStart(format!(
                "daemon not ready within {:?}",
                self.spawn_timeout
            ))),
        }
    }
}

/// Scan the child's stdout for the readiness marker.
async fn wait_for_ready<R>(stdout: R) -> ClientResult<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = lines.next_line().await.map_err(|err| {
            ClientError::DaemonStart(format!("reading daemon stdout: {err}"))
        })?;
        match line {
            Some(line) if line.contains(READY_MARKER) => return Ok(()),
            Some(line) => debug!(line, "daemon output before readiness"),
            None => {
                return Err(ClientError::DaemonStart(
                    "daemon exited before reporting readiness".to_string(),
                ))
            }
        }
    }
}
