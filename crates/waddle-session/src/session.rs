//! Sessions: the live, stateful wrapper around one client connection.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::connection::{Connection, InboundHandler};
use crate::types::{CloseReason, Device, Identity, Message, Principal, SessionId, SessionState};

/// Upper bound on writing out messages queued before a close.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Result of pushing a message onto a session's outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    /// Message was queued for delivery
    Queued,
    /// The outbound queue is full (backpressure); the message was dropped
    Full,
    /// The session is closed; the message was dropped
    Closed,
}

/// One logical client session.
///
/// Lifecycle: `Anonymous(temp)` → `Authenticated(uid, device)` → `Closed`.
/// Every method except [`run`](Session::run) is non-blocking and safe to call
/// from any task.
#[async_trait]
pub trait Session: Send + Sync + 'static {
    /// Immutable connection identifier.
    fn id(&self) -> SessionId;

    /// Current identity.
    fn identity(&self) -> Identity;

    /// Rebind the identity in place.
    ///
    /// Called exactly once per session, by the registry during sign-in.
    /// Re-authentication of an authenticated session is not supported.
    fn bind(&self, principal: Principal, device: Device);

    /// Read/deliver loop. Returns once the session is closed or the connection
    /// fails.
    async fn run(self: Arc<Self>);

    /// Non-blocking push onto the outbound path.
    fn enqueue(&self, message: Message) -> EnqueueResult;

    /// Force the session to end.
    ///
    /// Idempotent. Returns `true` only for the call that performed the
    /// transition; its reason is the one recorded.
    fn close(&self, reason: CloseReason) -> bool;

    fn is_closed(&self) -> bool;

    fn close_reason(&self) -> Option<CloseReason>;

    fn state(&self) -> SessionState {
        if self.is_closed() {
            SessionState::Closed
        } else if self.identity().is_anonymous() {
            SessionState::Anonymous
        } else {
            SessionState::Authenticated
        }
    }
}

/// Resources consumed by the run loop.
struct RunParts<C> {
    connection: C,
    outbound: mpsc::Receiver<Message>,
}

/// How the run loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    Closed,
    PeerHungUp,
    Failed,
}

/// Production [`Session`] backed by a transport [`Connection`].
pub struct ClientSession<C: Connection> {
    id: SessionId,
    identity: Mutex<Identity>,
    connected_at: DateTime<Utc>,
    outbound: mpsc::Sender<Message>,
    parts: Mutex<Option<RunParts<C>>>,
    handler: Arc<dyn InboundHandler>,
    close_reason: OnceLock<CloseReason>,
    shutdown: CancellationToken,
}

impl<C: Connection> ClientSession<C> {
    /// Wrap a freshly accepted connection, bound to `temp` on the unknown device.
    pub fn new(
        temp: Principal,
        connection: C,
        handler: Arc<dyn InboundHandler>,
        outbound_capacity: usize,
    ) -> Self {
        let (outbound, outbound_rx) = mpsc::channel(outbound_capacity.max(1));
        Self {
            id: SessionId::new(temp),
            identity: Mutex::new(Identity::anonymous(temp)),
            connected_at: Utc::now(),
            outbound,
            parts: Mutex::new(Some(RunParts {
                connection,
                outbound: outbound_rx,
            })),
            handler,
            close_reason: OnceLock::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    async fn pump(&self, connection: &mut C, outbound: &mut mpsc::Receiver<Message>) -> LoopExit {
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => return LoopExit::Closed,

                message = outbound.recv() => {
                    let Some(message) = message else {
                        return LoopExit::Closed;
                    };
                    if let Err(e) = connection.write_frame(message.into_payload()).await {
                        warn!(error = %e, "Error writing frame");
                        return LoopExit::Failed;
                    }
                }

                inbound = connection.read_frame() => match inbound {
                    Ok(Some(frame)) => self.handler.handle_frame(self.identity(), frame),
                    Ok(None) => return LoopExit::PeerHungUp,
                    Err(e) => {
                        warn!(error = %e, "Error reading frame");
                        return LoopExit::Failed;
                    }
                },
            }
        }
    }

    /// Write out messages queued before the session was closed.
    async fn flush(&self, connection: &mut C, outbound: &mut mpsc::Receiver<Message>) {
        let drain = async {
            while let Ok(message) = outbound.try_recv() {
                if let Err(e) = connection.write_frame(message.into_payload()).await {
                    debug!(error = %e, "Error flushing queued frame");
                    break;
                }
            }
        };
        if tokio::time::timeout(FLUSH_TIMEOUT, drain).await.is_err() {
            debug!("Timed out flushing queued frames");
        }
    }
}

#[async_trait]
impl<C: Connection> Session for ClientSession<C> {
    fn id(&self) -> SessionId {
        self.id
    }

    fn identity(&self) -> Identity {
        *self.identity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bind(&self, principal: Principal, device: Device) {
        let mut identity = self.identity.lock().unwrap_or_else(PoisonError::into_inner);
        let current = *identity;
        if !current.is_anonymous() {
            warn!(session = %self.id, current = %current, "Rebinding an authenticated session");
        }
        *identity = Identity::new(principal, device);
    }

    #[instrument(name = "gateway.session.run", skip(self), fields(session = %self.id))]
    async fn run(self: Arc<Self>) {
        let parts = self
            .parts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(RunParts {
            mut connection,
            mut outbound,
        }) = parts
        else {
            warn!("Session run loop already started");
            return;
        };

        let exit = if self.is_closed() {
            LoopExit::Closed
        } else {
            self.pump(&mut connection, &mut outbound).await
        };

        match exit {
            LoopExit::Closed => self.flush(&mut connection, &mut outbound).await,
            // Closed before the owner takes the registry lock, so no sign-in
            // can promote a dead connection in between.
            LoopExit::PeerHungUp | LoopExit::Failed => {
                self.close(CloseReason::ConnectionLost);
            }
        }

        if let Err(e) = connection.close().await {
            debug!(error = %e, "Error releasing connection");
        }

        let lifetime = Utc::now() - self.connected_at;
        info!(
            identity = %self.identity(),
            exit = ?exit,
            reason = ?self.close_reason(),
            lifetime_ms = lifetime.num_milliseconds(),
            "Session ended"
        );
    }

    fn enqueue(&self, message: Message) -> EnqueueResult {
        if self.is_closed() {
            return EnqueueResult::Closed;
        }
        match self.outbound.try_send(message) {
            Ok(()) => EnqueueResult::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(session = %self.id, "Outbound queue full, dropping message");
                EnqueueResult::Full
            }
            Err(mpsc::error::TrySendError::Closed(_)) => EnqueueResult::Closed,
        }
    }

    fn close(&self, reason: CloseReason) -> bool {
        if self.close_reason.set(reason).is_err() {
            return false;
        }
        self.shutdown.cancel();
        debug!(session = %self.id, reason = %reason, "Session closed");
        true
    }

    fn is_closed(&self) -> bool {
        self.close_reason.get().is_some()
    }

    fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason.get().copied()
    }
}

impl<C: Connection> std::fmt::Debug for ClientSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("id", &self.id)
            .field("identity", &self.identity())
            .field("closed", &self.is_closed())
            .finish()
    }
}
