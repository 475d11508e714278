use std::fs;
use std::io;
use std::sync::Arc;

use stash_protocol::READY_MARKER;
use stash_store::{SecretStore, StoreOptions};
use tokio::net::{UnixListener, UnixStream};
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};
use crate::handler::handle_connection;

/// The stash daemon.
pub struct Daemon {
    config: DaemonConfig,
    store: Arc<SecretStore>,
    shutdown: CancellationToken,
}

impl Daemon {
    /// Open the store and prepare to serve.
    ///
    /// Fails fast when another daemon holds the store's lock.
    pub fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let options = StoreOptions {
            deny_empty: config.deny_empty,
        };
        let store = SecretStore::open_with(&config.store_dir, options)?;
        Ok(Self {
            config,
            store: Arc::new(store),
            shutdown: CancellationToken::new(),
        })
    }

    /// Token that begins the drain when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancel the shutdown token when SIGINT, SIGTERM or SIGHUP arrives.
    pub fn spawn_signal_watcher(&self) {
        let token = self.shutdown.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            token.cancel();
        });
    }

    /// Bind the socket, print the readiness line, and serve until the
    /// shutdown token fires. In-flight exchanges finish before return.
    pub async fn run(self) -> DaemonResult<()> {
        let listener = self.bind().await?;

        // stdout is the readiness channel a spawning client watches;
        // everything else goes to stderr via tracing.
        println!(
            "stash: {}{}",
            READY_MARKER,
            self.config.socket_path.display()
        );
        info!(
            socket = %self.config.socket_path.display(),
            store = %self.config.store_dir.display(),
            "listening"
        );

        let mut connections = JoinSet::new();
        let mut conn_id: u64 = 0;
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => {
                            conn_id += 1;
                            let id = conn_id;
                            let store = Arc::clone(&self.store);
                            let token = self.shutdown.clone();
                            connections.spawn(async move {
                                if let Err(err) = handle_connection(stream, store, token, id).await {
                                    warn!(conn = id, error = %err, "connection failed");
                                }
                            });
                        }
                        Err(err) => warn!(error = %err, "accept failed"),
                    }
                }
                // Reap finished connection tasks as they complete, so the
                // set tracks only in-flight connections.
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(err) = joined {
                        warn!(error = %err, "connection task panicked");
                    }
                }
            }
        }

        drop(listener);
        info!(active = connections.len(), "draining");
        while let Some(joined) = connections.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "connection task panicked");
            }
        }

        if let Err(err) = fs::remove_file(&self.config.socket_path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(error = %err, "failed to unlink socket");
            }
        }
        info!("stopped");
        Ok(())
    }

    async fn bind(&self) -> DaemonResult<UnixListener> {
        if let Some(parent) = self.config.socket_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // A socket file may be left over from a daemon that died without
        // cleanup. Unlink it only after a probe confirms nothing accepts
        // on it; a successful probe means a live daemon owns the path.
        if self.config.socket_path.exists() {
            match UnixStream::connect(&self.config.socket_path).await {
                Ok(_) => {
                    return Err(DaemonError::Bind {
                        path: self.config.socket_path.clone(),
                        source: io::Error::new(
                            io::ErrorKind::AddrInUse,
                            "another daemon is serving this socket",
                        ),
                    });
                }
                Err(_) => {
                    debug!(socket = %self.config.socket_path.display(), "removing stale socket");
                    fs::remove_file(&self.config.socket_path)?;
                }
            }
        }

        UnixListener::bind(&self.config.socket_path).map_err(|source| DaemonError::Bind {
            path: self.config.socket_path.clone(),
            source,
        })
    }
}

/// Resolve once any of SIGINT, SIGTERM or SIGHUP is delivered.
async fn wait_for_signal() {
    let interrupt = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(err) => {
                error!("failed to install SIGINT handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                error!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    let hangup = async {
        match signal::unix::signal(signal::unix::SignalKind::hangup()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                error!("failed to install SIGHUP handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = interrupt => info!("received SIGINT, draining"),
        _ = terminate => info!("received SIGTERM, draining"),
        _ = hangup => info!("received SIGHUP, draining"),
    }
}
