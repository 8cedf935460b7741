//! Session manager: the facade used by gateway entry points and the message
//! routing layer.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, info_span, instrument, warn, Instrument};

use crate::connection::{Connection, DiscardInbound, InboundHandler};
use crate::ids::{IdGenerator, SequentialIds};
use crate::registry::{SessionRegistry, SignInOutcome};
use crate::session::{ClientSession, EnqueueResult, Session};
use crate::stats::{NoopStats, StatsSink};
use crate::types::{CloseReason, Device, Identity, Message, Principal};

/// Default outbound queue depth per session.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Session manager configuration.
#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    /// Outbound queue depth per session; messages beyond it are dropped
    pub outbound_capacity: usize,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

/// Outcome of [`SessionManager::enqueue_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryReport {
    /// No targeted device was online; the message was dropped.
    Offline,
    /// The message was handed to every targeted session that was still open.
    Delivered {
        /// Sessions that queued the message
        queued: usize,
        /// Sessions that closed or were saturated at delivery time
        dropped: usize,
    },
}

impl DeliveryReport {
    pub fn queued(&self) -> usize {
        match self {
            DeliveryReport::Offline => 0,
            DeliveryReport::Delivered { queued, .. } => *queued,
        }
    }
}

/// Orchestrates connect, sign-in, logout, fan-out and presence over one
/// [`SessionRegistry`].
///
/// Explicitly constructed; independent managers never share state. Lookup
/// misses are routine races with disconnects and are logged, never raised.
///
/// ## Usage
///
/// ```ignore
/// let manager = SessionManager::new(SessionManagerConfig::default())
///     .with_stats(OtelStats::new());
///
/// let temp = manager.connect(connection);          // transport accepted a socket
/// manager.sign_in(temp, uid, device);              // credentials validated elsewhere
/// manager.enqueue_message(uid, Device::ALL, msg);  // fan out to every device
/// manager.logout(uid, device);
/// ```
pub struct SessionManager {
    config: SessionManagerConfig,
    registry: Arc<SessionRegistry>,
    ids: Arc<dyn IdGenerator>,
    stats: Arc<dyn StatsSink>,
    inbound: Arc<dyn InboundHandler>,
}

impl SessionManager {
    /// Create a manager with a fresh registry, sequential temporary ids, no
    /// statistics and an inbound handler that discards frames.
    pub fn new(config: SessionManagerConfig) -> Self {
        Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            ids: Arc::new(SequentialIds::new()),
            stats: Arc::new(NoopStats),
            inbound: Arc::new(DiscardInbound),
        }
    }

    pub fn with_id_generator(mut self, ids: impl IdGenerator) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    pub fn with_stats(mut self, stats: impl StatsSink) -> Self {
        self.stats = Arc::new(stats);
        self
    }

    /// Set the handler receiving every inbound frame of sessions created by
    /// [`connect`](Self::connect) from now on.
    pub fn with_inbound_handler(mut self, handler: Arc<dyn InboundHandler>) -> Self {
        self.inbound = handler;
        self
    }

    pub fn config(&self) -> &SessionManagerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Register a freshly accepted connection and start its session.
    ///
    /// Returns the temporary principal that serves as the caller's handle
    /// until sign-in. Must be called within a Tokio runtime.
    #[instrument(skip(self, connection))]
    pub fn connect<C: Connection>(&self, connection: C) -> Principal {
        let temp = self.ids.next_temporary();
        let session: Arc<dyn Session> = Arc::new(ClientSession::new(
            temp,
            connection,
            Arc::clone(&self.inbound),
            self.config.outbound_capacity,
        ));

        self.registry.add(temp, Device::UNKNOWN, Arc::clone(&session));
        self.spawn_session(session);
        self.stats.connection_accepted();

        info!(temp = %temp, "Connection accepted");
        temp
    }

    /// Register an externally constructed session under its current identity
    /// and start its run loop.
    ///
    /// Any session already holding that identity is closed as superseded.
    #[instrument(skip(self, session), fields(session = %session.id()))]
    pub fn add_session(&self, session: Arc<dyn Session>) {
        let identity = session.identity();
        if self
            .registry
            .add(identity.principal, identity.device, Arc::clone(&session))
            .is_some()
        {
            self.stats.session_closed(identity, CloseReason::Superseded);
        }
        self.spawn_session(session);
    }

    /// Promote the connection `temp` to (uid, device).
    ///
    /// The caller has already validated the credentials. Any session on the
    /// same (uid, device) is closed as superseded; afterwards exactly one
    /// session, the promoted one, holds that slot.
    #[instrument(skip(self), fields(temp = %temp, uid = %uid, device = %device))]
    pub fn sign_in(&self, temp: Principal, uid: Principal, device: Device) -> SignInOutcome {
        if !temp.is_temporary() || !uid.is_permanent() || device.is_unknown() || device.is_broadcast() {
            warn!("Rejecting sign-in with invalid identity");
            return SignInOutcome::InvalidIdentity;
        }

        let outcome = self.registry.promote(temp, uid, device);
        match outcome {
            SignInOutcome::SignedIn { evicted } => {
                let identity = Identity::new(uid, device);
                self.stats.signed_in(identity);
                if evicted.is_some() {
                    self.stats.session_closed(identity, CloseReason::Superseded);
                }
                info!("Client signed in");
            }
            SignInOutcome::UnknownConnection => {
                warn!("Attempt to sign in a nonexistent connection");
            }
            SignInOutcome::InvalidIdentity => {}
        }
        outcome
    }

    /// Close and remove the session at (uid, device).
    ///
    /// Returns `false`, after logging, when no such session exists.
    #[instrument(skip(self), fields(uid = %uid, device = %device))]
    pub fn logout(&self, uid: Principal, device: Device) -> bool {
        match self.registry.remove(uid, device, CloseReason::UserInitiated) {
            Some(_) => {
                self.stats
                    .session_closed(Identity::new(uid, device), CloseReason::UserInitiated);
                info!("Client logout");
                true
            }
            None => {
                warn!("Logout for a user or device that is not signed in");
                false
            }
        }
    }

    /// Best-effort delivery of `message` to one device of `uid`, or to all of
    /// them when `device` is [`Device::ALL`].
    ///
    /// Messages for offline users are dropped, not stored. Sessions that close
    /// between the snapshot and delivery silently receive nothing.
    #[instrument(skip(self, message), fields(uid = %uid, device = %device, len = message.len()))]
    pub fn enqueue_message(&self, uid: Principal, device: Device, message: Message) -> DeliveryReport {
        let snapshot = self.registry.get(uid);

        let targets: Vec<_> = if device.is_broadcast() {
            snapshot.iter().collect()
        } else {
            snapshot
                .get(device)
                .map(|session| (device, session))
                .into_iter()
                .collect()
        };

        if targets.is_empty() {
            debug!("Recipient offline, dropping message");
            return DeliveryReport::Offline;
        }

        let mut queued = 0;
        let mut dropped = 0;
        for (target, session) in targets {
            match session.enqueue(message.clone()) {
                EnqueueResult::Queued => queued += 1,
                EnqueueResult::Closed => dropped += 1,
                EnqueueResult::Full => {
                    dropped += 1;
                    self.stats.message_dropped(Identity::new(uid, target));
                }
            }
        }

        debug!(queued, dropped, "Message fanned out");
        DeliveryReport::Delivered { queued, dropped }
    }

    /// Whether the user has at least one registered session.
    ///
    /// A snapshot: not linearizable with concurrent sign-in or logout.
    pub fn is_online(&self, uid: Principal) -> bool {
        self.registry.contains(uid)
    }

    pub fn is_device_online(&self, uid: Principal, device: Device) -> bool {
        self.registry.contains_device(uid, device)
    }

    /// Permanent user identifiers currently online.
    pub fn all_principals(&self) -> BTreeSet<Principal> {
        self.registry.principals().into_iter().collect()
    }

    /// Devices of `uid` currently online, in ascending order.
    pub fn devices(&self, uid: Principal) -> Vec<Device> {
        let mut devices = self.registry.get(uid).devices();
        devices.sort();
        devices
    }

    pub fn session_count(&self) -> usize {
        self.registry.session_count()
    }

    /// Close every session and empty the registry.
    #[instrument(skip(self))]
    pub fn shutdown(&self) {
        for session in self.registry.drain(CloseReason::Shutdown) {
            self.stats
                .session_closed(session.identity(), CloseReason::Shutdown);
        }
        info!("Session manager shut down");
    }

    /// Run the session on its own task; when the loop ends by itself, the
    /// connection failed and the session leaves the registry.
    fn spawn_session(&self, session: Arc<dyn Session>) {
        let registry = Arc::clone(&self.registry);
        let stats = Arc::clone(&self.stats);
        let span = info_span!("gateway.session.lifecycle", session = %session.id());

        tokio::spawn(
            async move {
                Arc::clone(&session).run().await;
                if let Some(identity) =
                    registry.remove_session(&session, CloseReason::ConnectionLost)
                {
                    let reason = session.close_reason().unwrap_or(CloseReason::ConnectionLost);
                    stats.session_closed(identity, reason);
                    debug!(identity = %identity, "Removed session after connection loss");
                }
                session.close(CloseReason::ConnectionLost);
            }
            .instrument(span),
        );
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish()
    }
}
