//! Newline-delimited framing over any byte stream.

use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, warn};
use waddle_session::{Connection, ConnectionError};

/// A [`Connection`] carrying one UTF-8 frame per line.
pub struct LinesConnection<T> {
    framed: Framed<T, LinesCodec>,
    peer: Option<SocketAddr>,
}

impl<T> LinesConnection<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap `io`, rejecting lines longer than `max_frame_len` bytes.
    pub fn new(io: T, max_frame_len: usize) -> Self {
        Self {
            framed: Framed::new(io, LinesCodec::new_with_max_length(max_frame_len)),
            peer: None,
        }
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }
}

fn codec_error(err: LinesCodecError) -> ConnectionError {
    match err {
        LinesCodecError::Io(e) => ConnectionError::Io(e),
        LinesCodecError::MaxLineLengthExceeded => ConnectionError::framing("line too long"),
    }
}

#[async_trait]
impl<T> Connection for LinesConnection<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn read_frame(&mut self) -> Result<Option<Bytes>, ConnectionError> {
        match self.framed.next().await {
            Some(Ok(line)) => Ok(Some(Bytes::from(line))),
            Some(Err(e)) => Err(codec_error(e)),
            None => Ok(None),
        }
    }

    async fn write_frame(&mut self, frame: Bytes) -> Result<(), ConnectionError> {
        // Messages are opaque; one this framing cannot carry is skipped.
        let Ok(line) = std::str::from_utf8(&frame) else {
            warn!(peer = ?self.peer, len = frame.len(), "Dropping outbound frame that is not UTF-8");
            return Ok(());
        };
        self.framed.send(line).await.map_err(codec_error)
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        debug!(peer = ?self.peer, "Closing connection");
        self.framed.get_mut().shutdown().await?;
        Ok(())
    }
}
