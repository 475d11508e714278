//! Per-connection request dispatch.
//!
//! A connection carries a sequence of exchanges. Each begins with a
//! request frame and ends with `Done` or `Error`:
//!
//! - `List`, `Log`: zero or more `Entry` frames, then `Done`.
//! - `Get`: zero or more `Chunk` frames, then `Done` carrying metadata.
//! - `Set`: the client streams `Chunk` frames and finishes with
//!   `SetDone`; the commit receipt comes back in `Done`.
//! - `Del`, `Revert`: a bare `Done` (with metadata for `Revert`).
//!
//! Store-level failures are reported in an `Error` frame and the
//! connection stays usable. Protocol violations also produce an `Error`
//! frame, after which the connection is closed.

use std::io;
use std::sync::Arc;

use stash_protocol::{read_frame, write_frame, ErrorKind, Message, ProtocolError};
use stash_store::{SecretStore, Spool, StoreError};
use stash_types::{Selector, CHUNK_SIZE};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{DaemonError, DaemonResult};

/// Frames buffered between the socket reader and the spool writer.
/// Bounds memory per upload to roughly this many wire chunks.
const SPOOL_QUEUE_DEPTH: usize = 8;

/// Serve one client connection until it closes or the drain begins.
pub async fn handle_connection(
    stream: UnixStream,
    store: Arc<SecretStore>,
    shutdown: CancellationToken,
    conn_id: u64,
) -> DaemonResult<()> {
    let (mut reader, mut writer) = stream.into_split();
    let result = serve(&mut reader, &mut writer, &store, &shutdown, conn_id).await;
    if let Err(DaemonError::Protocol(err)) = &result {
        // Best effort; the peer may already be gone.
        let frame = Message::Error {
            kind: ErrorKind::Protocol,
            message: err.to_string(),
        };
        let _ = write_frame(&mut writer, &frame).await;
    }
    result
}

async fn serve<R, W>(
    reader: &mut R,
    writer: &mut W,
    store: &Arc<SecretStore>,
    shutdown: &CancellationToken,
    conn_id: u64,
) -> DaemonResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        // The drain only interrupts connections sitting between
        // exchanges; once a request frame arrives the exchange runs to
        // completion.
        let request = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(conn = conn_id, "closing idle connection for drain");
                return Ok(());
            }
            frame = read_frame(reader) => match frame? {
                Some(message) => message,
                None => return Ok(()),
            },
        };

        debug!(conn = conn_id, request = request.type_name(), "dispatch");
        match request {
            Message::List { all } => handle_list(writer, store, all).await?,
            Message::Get { name, selector } => handle_get(writer, store, name, selector).await?,
            Message::Set { name } => handle_set(reader, writer, store, name).await?,
            Message::Log { name, limit } => handle_log(writer, store, name, limit).await?,
            Message::Del { name } => handle_del(writer, store, name).await?,
            Message::Revert { name, revision } => {
                handle_revert(writer, store, name, revision).await?
            }
            other => {
                return Err(ProtocolError::UnexpectedFrame {
                    got: other.type_name(),
                    context: "awaiting a request".into(),
                }
                .into());
            }
        }
    }
}

/// Run a store call on the blocking pool.
async fn run_store<T, F>(store: &Arc<SecretStore>, f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&SecretStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(store);
    match tokio::task::spawn_blocking(move || f(&store)).await {
        Ok(result) => result,
        Err(err) => Err(StoreError::Io(io::Error::other(err))),
    }
}

fn error_kind(err: &StoreError) -> ErrorKind {
    match err {
        StoreError::NotFound(_) => ErrorKind::NotFound,
        StoreError::AmbiguousSelector { .. } => ErrorKind::AmbiguousSelector,
        StoreError::Validation(_) => ErrorKind::Validation,
        StoreError::Serialization(_)
        | StoreError::Corrupt(_)
        | StoreError::Kv(_)
        | StoreError::Io(_) => ErrorKind::Storage,
    }
}

/// Report a store failure to the client and keep the connection open.
async fn write_store_error<W>(writer: &mut W, err: StoreError) -> DaemonResult<()>
where
    W: AsyncWrite + Unpin,
{
    warn!(error = %err, "request failed");
    write_frame(
        writer,
        &Message::Error {
            kind: error_kind(&err),
            message: err.to_string(),
        },
    )
    .await?;
    Ok(())
}

async fn handle_list<W>(writer: &mut W, store: &Arc<SecretStore>, all: bool) -> DaemonResult<()>
where
    W: AsyncWrite + Unpin,
{
    let entries = match run_store(store, move |s| s.list(all)).await {
        Ok(entries) => entries,
        Err(err) => return write_store_error(writer, err).await,
    };
    for meta in entries {
        write_frame(writer, &Message::Entry { meta }).await?;
    }
    write_frame(writer, &Message::Done { meta: None }).await?;
    Ok(())
}

async fn handle_log<W>(
    writer: &mut W,
    store: &Arc<SecretStore>,
    name: String,
    limit: u64,
) -> DaemonResult<()>
where
    W: AsyncWrite + Unpin,
{
    let entries = match run_store(store, move |s| s.history(&name, limit as usize)).await {
        Ok(entries) => entries,
        Err(err) => return write_store_error(writer, err).await,
    };
    for meta in entries {
        write_frame(writer, &Message::Entry { meta }).await?;
    }
    write_frame(writer, &Message::Done { meta: None }).await?;
    Ok(())
}

async fn handle_get<W>(
    writer: &mut W,
    store: &Arc<SecretStore>,
    name: String,
    selector: Option<Selector>,
) -> DaemonResult<()>
where
    W: AsyncWrite + Unpin,
{
    let meta = match run_store(store, move |s| s.resolve(&name, selector.as_ref())).await {
        Ok(meta) => meta,
        Err(err) => return write_store_error(writer, err).await,
    };

    // One chunk per snapshot, so no read transaction is held across a
    // socket write. Content is immutable once stored, so the chunks
    // assemble consistently regardless.
    let count = meta.chunk_count(CHUNK_SIZE);
    for index in 1..=count {
        let digest = meta.digest;
        let data = match run_store(store, move |s| s.read_chunk(&digest, index)).await {
            Ok(data) => data,
            Err(err) => return write_store_error(writer, err).await,
        };
        write_frame(writer, &Message::Chunk { data }).await?;
    }
    write_frame(writer, &Message::Done { meta: Some(meta) }).await?;
    Ok(())
}

async fn handle_set<R, W>(
    reader: &mut R,
    writer: &mut W,
    store: &Arc<SecretStore>,
    name: String,
) -> DaemonResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let spool = match run_store(store, |s| s.spool()).await {
        Ok(spool) => spool,
        Err(err) => return write_store_error(writer, err).await,
    };

    // Incoming chunks are handed to a blocking worker that owns the
    // spool, so socket reads overlap disk writes. The bounded channel is
    // the backpressure: once full, the reader stops pulling frames and
    // the client blocks in its own send.
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(SPOOL_QUEUE_DEPTH);
    let worker = tokio::task::spawn_blocking(move || -> Result<Spool, StoreError> {
        let mut spool = spool;
        while let Some(data) = rx.blocking_recv() {
            spool.append(&data)?;
        }
        Ok(spool)
    });

    let mut completed = false;
    let mut sink = false;
    loop {
        match read_frame(reader).await? {
            Some(Message::Chunk { data }) => {
                if !sink && tx.send(data).await.is_err() {
                    // The worker died. Keep consuming frames so the
                    // client is never blocked writing while we hold an
                    // error it has yet to hear about.
                    sink = true;
                }
            }
            Some(Message::SetDone) => {
                completed = true;
                break;
            }
            Some(other) => {
                drop(tx);
                let _ = worker.await;
                return Err(ProtocolError::UnexpectedFrame {
                    got: other.type_name(),
                    context: format!("streaming payload for {name}"),
                }
                .into());
            }
            None => break,
        }
    }

    drop(tx);
    let outcome = match worker.await {
        Ok(result) => result,
        Err(err) => Err(StoreError::Io(io::Error::other(err))),
    };

    if !completed {
        // The client went away before finishing; the spool is dropped
        // and nothing was committed.
        debug!(name = %name, "upload abandoned before completion");
        return Ok(());
    }
    let spool = match outcome {
        Ok(spool) => spool,
        Err(err) => return write_store_error(writer, err).await,
    };
    let meta = match run_store(store, move |s| s.commit_spool(&name, spool.seal()?)).await {
        Ok(meta) => meta,
        Err(err) => return write_store_error(writer, err).await,
    };
    write_frame(writer, &Message::Done { meta: Some(meta) }).await?;
    Ok(())
}

async fn handle_del<W>(writer: &mut W, store: &Arc<SecretStore>, name: String) -> DaemonResult<()>
where
    W: AsyncWrite + Unpin,
{
    match run_store(store, move |s| s.delete(&name)).await {
        Ok(_) => write_frame(writer, &Message::Done { meta: None }).await?,
        Err(err) => return write_store_error(writer, err).await,
    }
    Ok(())
}

async fn handle_revert<W>(
    writer: &mut W,
    store: &Arc<SecretStore>,
    name: String,
    revision: u64,
) -> DaemonResult<()>
where
    W: AsyncWrite + Unpin,
{
    match run_store(store, move |s| s.revert(&name, revision)).await {
        Ok(meta) => write_frame(writer, &Message::Done { meta: Some(meta) }).await?,
        Err(err) => return write_store_error(writer, err).await,
    }
    Ok(())
}
