//! Common types for the session core.

use std::fmt;

use bytes::Bytes;

/// Identity value indexing the session registry.
///
/// Permanent user identifiers are positive. Temporary principals, issued to a
/// connection before it signs in, are strictly negative so the two ranges can
/// never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Principal(i64);

impl Principal {
    /// Wrap a raw identifier.
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// The raw identifier.
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Whether this principal was issued to an unauthenticated connection.
    pub const fn is_temporary(self) -> bool {
        self.0 < 0
    }

    /// Whether this principal is a real user identifier.
    pub const fn is_permanent(self) -> bool {
        self.0 > 0
    }
}

impl From<i64> for Principal {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Discriminator letting one principal hold several simultaneous sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Device(i64);

impl Device {
    /// Placeholder device of a connection that has not signed in yet.
    pub const UNKNOWN: Device = Device(-1);

    /// Broadcast sentinel: address every device of a user.
    pub const ALL: Device = Device(0);

    /// Wrap a raw device identifier.
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// The raw device identifier.
    pub const fn get(self) -> i64 {
        self.0
    }

    pub const fn is_unknown(self) -> bool {
        self.0 == Self::UNKNOWN.0
    }

    pub const fn is_broadcast(self) -> bool {
        self.0 == Self::ALL.0
    }
}

impl From<i64> for Device {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Device::UNKNOWN => write!(f, "unknown"),
            Device::ALL => write!(f, "all"),
            Device(raw) => write!(f, "{}", raw),
        }
    }
}

/// A (principal, device) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity {
    pub principal: Principal,
    pub device: Device,
}

impl Identity {
    pub const fn new(principal: Principal, device: Device) -> Self {
        Self { principal, device }
    }

    /// Identity of a freshly connected, unauthenticated session.
    pub const fn anonymous(temp: Principal) -> Self {
        Self::new(temp, Device::UNKNOWN)
    }

    pub const fn is_anonymous(&self) -> bool {
        self.principal.is_temporary()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.principal, self.device)
    }
}

/// Immutable identifier of one physical connection.
///
/// It is the temporary principal issued at connect time and never changes,
/// even after sign-in rebinds the session's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Principal);

impl SessionId {
    pub const fn new(temp: Principal) -> Self {
        Self(temp)
    }

    pub const fn principal(self) -> Principal {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0.get().unsigned_abs())
    }
}

/// Opaque payload routed to a session. Never inspected by this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message(Bytes);

impl Message {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self(payload.into())
    }

    pub fn payload(&self) -> &Bytes {
        &self.0
    }

    pub fn into_payload(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Bytes> for Message {
    fn from(payload: Bytes) -> Self {
        Self(payload)
    }
}

impl From<&'static str> for Message {
    fn from(payload: &'static str) -> Self {
        Self(Bytes::from_static(payload.as_bytes()))
    }
}

impl From<String> for Message {
    fn from(payload: String) -> Self {
        Self(Bytes::from(payload))
    }
}

/// Why a session ended.
///
/// Surfaced to the transport layer only as "session ended"; translating it
/// into a wire-level notification is a transport concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CloseReason {
    /// The user logged out.
    UserInitiated,
    /// A newer sign-in claimed the same (uid, device) slot.
    Superseded,
    /// The connection failed or the peer hung up.
    ConnectionLost,
    /// The gateway is shutting down.
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::UserInitiated => write!(f, "user-initiated"),
            CloseReason::Superseded => write!(f, "superseded-by-newer-login"),
            CloseReason::ConnectionLost => write!(f, "connection-lost"),
            CloseReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, bound to a temporary principal
    Anonymous,
    /// Signed in as a permanent (uid, device)
    Authenticated,
    /// Terminal
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Anonymous => write!(f, "anonymous"),
            SessionState::Authenticated => write!(f, "authenticated"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}
