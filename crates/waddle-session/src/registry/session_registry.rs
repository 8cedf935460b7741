//! Session Registry implementation.
//!
//! Maps user identifiers to their device sets behind a single lock. Every
//! public operation is one critical section, including the compound sign-in
//! transition, and no critical section performs connection I/O: closing a
//! session only records the reason and cancels its run loop.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, instrument, warn};

use super::devices::{DeviceSet, DeviceSnapshot};
use crate::session::Session;
use crate::types::{CloseReason, Device, Identity, Principal, SessionId};

/// Result of promoting a temporary connection to a user identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInOutcome {
    /// The connection now owns the (uid, device) slot.
    SignedIn {
        /// Connection that held the slot before and was closed as superseded
        evicted: Option<SessionId>,
    },
    /// No open session is registered under the temporary principal
    UnknownConnection,
    /// The request named a temporary uid or a non-temporary connection id
    InvalidIdentity,
}

impl SignInOutcome {
    pub fn is_signed_in(&self) -> bool {
        matches!(self, SignInOutcome::SignedIn { .. })
    }
}

/// Concurrency-safe registry of live sessions, keyed by principal then device.
///
/// Invariants, observable at every instant:
/// - at most one session per (principal, device);
/// - a device set is never left empty;
/// - every reachable session is open, because removal and close happen in the
///   same critical section.
///
/// ## Usage
///
/// ```ignore
/// let registry = SessionRegistry::new();
///
/// // When a connection is accepted:
/// registry.add(temp, Device::UNKNOWN, session);
///
/// // When the connection signs in:
/// registry.promote(temp, uid, device);
///
/// // When routing a message, copy then deliver outside the lock:
/// for (_, session) in registry.get(uid).iter() {
///     session.enqueue(message.clone());
/// }
/// ```
pub struct SessionRegistry {
    users: RwLock<HashMap<Principal, DeviceSet>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        info!("Creating session registry");
        Self {
            users: RwLock::new(HashMap::new()),
        }
    }

    // Each critical section leaves the map consistent before it can panic, so
    // a poisoned lock is safe to keep using.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Principal, DeviceSet>> {
        self.users.read().unwrap_or_else(|poisoned| {
            warn!("Session registry lock poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Principal, DeviceSet>> {
        self.users.write().unwrap_or_else(|poisoned| {
            warn!("Session registry lock poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    /// Point-in-time copy of a user's devices; empty if the user is absent.
    pub fn get(&self, uid: Principal) -> DeviceSnapshot {
        self.read()
            .get(&uid)
            .map(DeviceSet::snapshot)
            .unwrap_or_default()
    }

    /// Register a session under (uid, device), replacing any occupant.
    ///
    /// A displaced session is closed as superseded and returned.
    #[instrument(skip(self, session), fields(uid = %uid, device = %device))]
    pub fn add(
        &self,
        uid: Principal,
        device: Device,
        session: Arc<dyn Session>,
    ) -> Option<Arc<dyn Session>> {
        let mut users = self.write();
        let displaced = users
            .entry(uid)
            .or_default()
            .put(device, Arc::clone(&session));

        match displaced {
            Some(old) if old.id() != session.id() => {
                old.close(CloseReason::Superseded);
                debug!(evicted = %old.id(), "Replaced existing session");
                Some(old)
            }
            Some(_) => None,
            None => {
                debug!(session = %session.id(), "Registered session");
                None
            }
        }
    }

    /// Remove and close the session at (uid, device).
    ///
    /// Prunes the user entry when its last device goes.
    #[instrument(skip(self), fields(uid = %uid, device = %device))]
    pub fn remove(
        &self,
        uid: Principal,
        device: Device,
        reason: CloseReason,
    ) -> Option<Arc<dyn Session>> {
        let mut users = self.write();
        let removed = Self::take(&mut users, uid, device);
        match &removed {
            Some(session) => {
                session.close(reason);
                debug!(session = %session.id(), reason = %reason, "Removed session");
            }
            None => debug!("Session was not registered"),
        }
        removed
    }

    /// Remove `session` only if it still occupies the slot of its current
    /// identity.
    ///
    /// Used when a run loop ends on its own: by then a newer sign-in may own
    /// the slot, and that session must stay. Returns the identity removed.
    #[instrument(skip(self, session), fields(session = %session.id()))]
    pub fn remove_session(&self, session: &Arc<dyn Session>, reason: CloseReason) -> Option<Identity> {
        let mut users = self.write();
        // Identity is only rebound under this lock, so it cannot move under us.
        let identity = session.identity();
        let owns_slot = users
            .get(&identity.principal)
            .and_then(|set| set.get(identity.device))
            .is_some_and(|current| current.id() == session.id());

        if !owns_slot {
            debug!(identity = %identity, "Session no longer owns its slot");
            return None;
        }

        if let Some(removed) = Self::take(&mut users, identity.principal, identity.device) {
            removed.close(reason);
        }
        debug!(identity = %identity, reason = %reason, "Removed session");
        Some(identity)
    }

    /// Promote the connection registered under `temp` to (uid, device).
    ///
    /// One critical section: rebind the session, evict and close any occupant
    /// of (uid, device), install the session, drop the temporary entry. No
    /// observer can see the session under both principals or under neither.
    #[instrument(skip(self), fields(temp = %temp, uid = %uid, device = %device))]
    pub fn promote(&self, temp: Principal, uid: Principal, device: Device) -> SignInOutcome {
        let mut users = self.write();

        let closed = users
            .get(&temp)
            .and_then(|set| set.get(Device::UNKNOWN))
            .is_some_and(|session| session.is_closed());
        if closed {
            // Its run loop has ended; cleanup will remove the entry.
            debug!("Connection closed before sign-in");
            return SignInOutcome::UnknownConnection;
        }

        let Some(session) = Self::take(&mut users, temp, Device::UNKNOWN) else {
            debug!("No session registered under temporary principal");
            return SignInOutcome::UnknownConnection;
        };

        session.bind(uid, device);

        let evicted = users
            .entry(uid)
            .or_default()
            .put(device, Arc::clone(&session))
            .map(|old| {
                old.close(CloseReason::Superseded);
                old.id()
            });

        match evicted {
            Some(old) => info!(session = %session.id(), evicted = %old, "Signed in, evicted previous session"),
            None => debug!(session = %session.id(), "Signed in"),
        }

        SignInOutcome::SignedIn { evicted }
    }

    /// Whether the user has any registered device.
    pub fn contains(&self, uid: Principal) -> bool {
        self.read().contains_key(&uid)
    }

    pub fn contains_device(&self, uid: Principal, device: Device) -> bool {
        self.read()
            .get(&uid)
            .is_some_and(|set| set.get(device).is_some())
    }

    /// Permanent user identifiers currently registered.
    pub fn principals(&self) -> Vec<Principal> {
        self.read()
            .keys()
            .copied()
            .filter(|uid| uid.is_permanent())
            .collect()
    }

    /// Number of principals (temporary included) with at least one session.
    pub fn user_count(&self) -> usize {
        self.read().len()
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.read().values().map(DeviceSet::len).sum()
    }

    /// Close and remove every session.
    #[instrument(skip(self))]
    pub fn drain(&self, reason: CloseReason) -> Vec<Arc<dyn Session>> {
        let mut users = self.write();
        let drained: Vec<_> = users
            .drain()
            .flat_map(|(_, mut set)| set.drain().map(|(_, s)| s).collect::<Vec<_>>())
            .collect();
        for session in &drained {
            session.close(reason);
        }
        info!(count = drained.len(), reason = %reason, "Drained session registry");
        drained
    }

    /// Remove (uid, device) from the map, pruning an emptied device set.
    fn take(
        users: &mut HashMap<Principal, DeviceSet>,
        uid: Principal,
        device: Device,
    ) -> Option<Arc<dyn Session>> {
        let set = users.get_mut(&uid)?;
        let removed = set.remove(device);
        if set.is_empty() {
            users.remove(&uid);
        }
        removed
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("user_count", &self.user_count())
            .field("session_count", &self.session_count())
            .finish()
    }
}
