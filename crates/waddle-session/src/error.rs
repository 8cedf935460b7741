//! Error types for the session core.
//!
//! Registry misses (unknown temporary id, absent user or device) are routine
//! races in a gateway and are reported as outcome values, not errors. The only
//! error type here describes transport failures, which end the owning
//! session's run loop and nothing else.

use thiserror::Error;

/// Failure reported by a [`Connection`](crate::Connection).
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// IO error (network, socket)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame could not be decoded or encoded
    #[error("Framing error: {0}")]
    Framing(String),

    /// The connection was already closed
    #[error("Connection closed")]
    Closed,
}

impl ConnectionError {
    /// Create a new framing error.
    pub fn framing(msg: impl Into<String>) -> Self {
        Self::Framing(msg.into())
    }
}
