//! Async frame I/O over a byte stream.
//!
//! One frame is `[u32 BE length][u8 tag][bincode payload]`; the length
//! covers the tag and payload. EOF at a frame boundary is a normal end of
//! stream, EOF inside a frame is an error, which is how an aborted `Set`
//! upload is told apart from a finished one.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::codec::Codec;
use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{Message, MAX_MESSAGE_SIZE};

/// Read one framed message, or `None` on clean EOF at a frame boundary.
pub async fn read_frame<R>(reader: &mut R) -> ProtocolResult<Option<Message>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len < 1 {
        return Err(ProtocolError::FramingError("zero-length frame".into()));
    }
    if len - 1 > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len - 1,
            max: MAX_MESSAGE_SIZE,
        });
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            ProtocolError::FramingError("connection closed mid-frame".into())
        } else {
            ProtocolError::Io(e)
        }
    })?;
    // body[0] is the advisory tag; the enum encoding identifies itself.
    let msg: Message = bincode::deserialize(&body[1..])
        .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
    trace!(frame = msg.type_name(), len, "frame read");
    Ok(Some(msg))
}

/// Write one framed message and flush.
pub async fn write_frame<W>(writer: &mut W, msg: &Message) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin,
{
    let buf = Codec::encode(msg)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    trace!(frame = msg.type_name(), len = buf.len(), "frame written");
    Ok(())
}
