//! Typed requests over one daemon connection.
//!
//! Every method runs a full exchange: send the request frame, consume
//! the reply frames up to the terminator, and translate an in-band
//! `Error` frame into [`ClientError::Remote`]. The connection stays
//! usable after a remote error, so a CLI invocation can run several
//! requests over one socket.

use std::path::Path;

use stash_protocol::{read_frame, write_frame, Message, ProtocolError};
use stash_types::{Metadata, Selector, CHUNK_SIZE};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::debug;

use crate::error::{ClientError, ClientResult};

/// A connection to the stash daemon.
#[derive(Debug)]
pub struct Client {
    stream: UnixStream,
}

impl Client {
    /// Connect to a daemon already listening on `socket_path`.
    pub async fn connect(socket_path: &Path) -> ClientResult<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        debug!(socket = %socket_path.display(), "connected");
        Ok(Self { stream })
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: UnixStream) -> Self {
        Self { stream }
    }

    /// Current heads, lexicographic by name.
    pub async fn list(&mut self, all: bool) -> ClientResult<Vec<Metadata>> {
        write_frame(&mut self.stream, &Message::List { all }).await?;
        self.collect_entries("listing entries").await
    }

    /// Revisions of `name`, newest first. A `limit` of zero means all.
    pub async fn log(&mut self, name: &str, limit: u64) -> ClientResult<Vec<Metadata>> {
        write_frame(
            &mut self.stream,
            &Message::Log {
                name: name.to_string(),
                limit,
            },
        )
        .await?;
        self.collect_entries("listing history").await
    }

    /// Stream a payload into `sink`, returning its metadata.
    pub async fn get<W>(
        &mut self,
        name: &str,
        selector: Option<Selector>,
        sink: &mut W,
    ) -> ClientResult<Metadata>
    where
        W: AsyncWrite + Unpin,
    {
        write_frame(
            &mut self.stream,
            &Message::Get {
                name: name.to_string(),
                selector,
            },
        )
        .await?;
        loop {
            match self.read_reply().await? {
                Message::Chunk { data } => sink.write_all(&data).await?,
                Message::Done { meta: Some(meta) } => {
                    sink.flush().await?;
                    return Ok(meta);
                }
                other => return Err(unexpected(other, "streaming payload")),
            }
        }
    }

    /// Fetch a payload into memory.
    pub async fn get_bytes(
        &mut self,
        name: &str,
        selector: Option<Selector>,
    ) -> ClientResult<(Vec<u8>, Metadata)> {
        let mut payload = Vec::new();
        let meta = self.get(name, selector, &mut payload).await?;
        Ok((payload, meta))
    }

    /// Stream `source` to the daemon as the next revision of `name`.
    ///
    /// The payload is chunked as it is read, so it is never held in
    /// memory whole. The commit receipt comes back once the daemon has
    /// made the revision durable.
    pub async fn set<R>(&mut self, name: &str, source: &mut R) -> ClientResult<Metadata>
    where
        R: AsyncRead + Unpin,
    {
        write_frame(
            &mut self.stream,
            &Message::Set {
                name: name.to_string(),
            },
        )
        .await?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = source.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            write_frame(
                &mut self.stream,
                &Message::Chunk {
                    data: buf[..n].to_vec(),
                },
            )
            .await?;
        }
        write_frame(&mut self.stream, &Message::SetDone).await?;
        match self.read_reply().await? {
            Message::Done { meta: Some(meta) } => Ok(meta),
            other => Err(unexpected(other, "awaiting commit receipt")),
        }
    }

    /// Store an in-memory payload as the next revision of `name`.
    pub async fn set_bytes(&mut self, name: &str, payload: &[u8]) -> ClientResult<Metadata> {
        let mut source = payload;
        self.set(name, &mut source).await
    }

    /// Remove the head of `name`. Succeeds whether or not it existed.
    pub async fn del(&mut self, name: &str) -> ClientResult<()> {
        write_frame(
            &mut self.stream,
            &Message::Del {
                name: name.to_string(),
            },
        )
        .await?;
        match self.read_reply().await? {
            Message::Done { .. } => Ok(()),
            other => Err(unexpected(other, "awaiting delete acknowledgement")),
        }
    }

    /// Point the head of `name` back at `revision`.
    pub async fn revert(&mut self, name: &str, revision: u64) -> ClientResult<Metadata> {
        write_frame(
            &mut self.stream,
            &Message::Revert {
                name: name.to_string(),
                revision,
            },
        )
        .await?;
        match self.read_reply().await? {
            Message::Done { meta: Some(meta) } => Ok(meta),
            other => Err(unexpected(other, "awaiting revert receipt")),
        }
    }

    async fn collect_entries(&mut self, context: &str) -> ClientResult<Vec<Metadata>> {
        let mut entries = Vec::new();
        loop {
            match self.read_reply().await? {
                Message::Entry { meta } => entries.push(meta),
                Message::Done { .. } => return Ok(entries),
                other => return Err(unexpected(other, context)),
            }
        }
    }

    /// Next reply frame, with `Error` frames lifted into `Remote` and
    /// mid-exchange EOF reported as a framing failure.
    async fn read_reply(&mut self) -> ClientResult<Message> {
        match read_frame(&mut self.stream).await? {
            Some(Message::Error { kind, message }) => Err(ClientError::Remote { kind, message }),
            Some(msg) => Ok(msg),
            None => {
                Err(ProtocolError::FramingError("connection closed before reply".into()).into())
            }
        }
    }
}

fn unexpected(msg: Message, context: &str) -> ClientError {
    ProtocolError::UnexpectedFrame {
        got: msg.type_name(),
        context: context.to_string(),
    }
    .into()
}
