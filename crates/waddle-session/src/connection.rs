//! Transport-facing collaborator traits.
//!
//! The session core never frames bytes itself. The transport layer supplies a
//! [`Connection`] per accepted socket, and the messaging layer supplies an
//! [`InboundHandler`] that receives every frame a client sends.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::ConnectionError;
use crate::types::Identity;

/// One physical client connection.
///
/// Exclusively owned by the session wrapping it.
#[async_trait]
pub trait Connection: Send + 'static {
    /// Read the next inbound frame.
    ///
    /// Returns `Ok(None)` when the peer closed the connection cleanly.
    /// Must be cancel-safe: the run loop races it against outbound delivery
    /// and close requests, and a dropped read must not lose a partial frame.
    async fn read_frame(&mut self) -> Result<Option<Bytes>, ConnectionError>;

    /// Write one outbound frame.
    async fn write_frame(&mut self, frame: Bytes) -> Result<(), ConnectionError>;

    /// Release the underlying connection.
    async fn close(&mut self) -> Result<(), ConnectionError>;
}

/// Receives inbound frames for dispatch to the messaging layer.
///
/// Called from the session's own task with the identity the session held when
/// the frame was read. Implementations must not block.
pub trait InboundHandler: Send + Sync + 'static {
    fn handle_frame(&self, from: Identity, frame: Bytes);
}

/// Handler that drops every inbound frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardInbound;

impl InboundHandler for DiscardInbound {
    fn handle_frame(&self, from: Identity, frame: Bytes) {
        debug!(from = %from, len = frame.len(), "Discarding inbound frame");
    }
}
