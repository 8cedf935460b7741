//! Test utilities for session integration testing.
//!
//! Provides an in-memory connection whose far end is driven by the test, an
//! inbound handler that records frames, and polling helpers.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::timeout;
use waddle_session::{Connection, ConnectionError, Identity, InboundHandler};

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Install a test subscriber once so `RUST_LOG` works in tests.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Server side of an in-memory connection.
pub struct MemoryConnection {
    inbound: mpsc::UnboundedReceiver<Bytes>,
    outbound: mpsc::UnboundedSender<Bytes>,
    releases: Arc<AtomicUsize>,
}

/// Client side of an in-memory connection, driven by the test.
pub struct Peer {
    to_server: Option<mpsc::UnboundedSender<Bytes>>,
    from_server: mpsc::UnboundedReceiver<Bytes>,
    releases: Arc<AtomicUsize>,
}

pub fn connection_pair() -> (MemoryConnection, Peer) {
    let (to_server, inbound) = mpsc::unbounded_channel();
    let (outbound, from_server) = mpsc::unbounded_channel();
    let releases = Arc::new(AtomicUsize::new(0));
    (
        MemoryConnection {
            inbound,
            outbound,
            releases: Arc::clone(&releases),
        },
        Peer {
            to_server: Some(to_server),
            from_server,
            releases,
        },
    )
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn read_frame(&mut self) -> Result<Option<Bytes>, ConnectionError> {
        Ok(self.inbound.recv().await)
    }

    async fn write_frame(&mut self, frame: Bytes) -> Result<(), ConnectionError> {
        // A peer that stopped listening is not a failure of the session.
        let _ = self.outbound.send(frame);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Peer {
    /// Send a frame to the server.
    pub fn send(&self, frame: &'static str) {
        if let Some(tx) = &self.to_server {
            let _ = tx.send(Bytes::from_static(frame.as_bytes()));
        }
    }

    /// Wait for the next frame written by the server.
    pub async fn recv(&mut self) -> Option<Bytes> {
        timeout(DEFAULT_TIMEOUT, self.from_server.recv())
            .await
            .ok()
            .flatten()
    }

    /// Wait briefly and report whether anything was written.
    pub async fn recv_nothing(&mut self) -> bool {
        timeout(Duration::from_millis(100), self.from_server.recv())
            .await
            .is_err()
    }

    /// Simulate the client hanging up.
    pub fn hang_up(&mut self) {
        self.to_server = None;
    }

    /// How many times the server released this connection.
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

/// Inbound handler recording every frame with the sender identity.
#[derive(Default)]
pub struct RecordingHandler {
    frames: Mutex<Vec<(Identity, Bytes)>>,
}

impl RecordingHandler {
    pub fn frames(&self) -> Vec<(Identity, Bytes)> {
        self.frames.lock().unwrap().clone()
    }
}

impl InboundHandler for RecordingHandler {
    fn handle_frame(&self, from: Identity, frame: Bytes) {
        self.frames.lock().unwrap().push((from, frame));
    }
}

/// Poll `condition` until it holds or the default timeout expires.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    let poll = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    timeout(DEFAULT_TIMEOUT, poll).await.is_ok()
}

/// Run a future with the default timeout, panicking on expiry.
pub async fn within<F: Future>(fut: F) -> F::Output {
    timeout(DEFAULT_TIMEOUT, fut)
        .await
        .expect("operation timed out")
}
