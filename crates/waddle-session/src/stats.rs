//! Statistics hooks.
//!
//! Fire-and-forget: implementations must never block or fail the caller.

use crate::types::{CloseReason, Identity};

/// Counter hooks invoked by the session manager.
///
/// Only [`connection_accepted`](StatsSink::connection_accepted) is required;
/// the rest default to no-ops.
pub trait StatsSink: Send + Sync + 'static {
    /// A transport connection was accepted and registered.
    fn connection_accepted(&self);

    /// A connection was promoted to a permanent identity.
    fn signed_in(&self, _identity: Identity) {}

    /// A session left the registry.
    fn session_closed(&self, _identity: Identity, _reason: CloseReason) {}

    /// A message could not be queued for a device.
    fn message_dropped(&self, _identity: Identity) {}
}

/// Discards every statistic.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStats;

impl StatsSink for NoopStats {
    fn connection_accepted(&self) {}
}
