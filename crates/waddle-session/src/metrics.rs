//! OpenTelemetry-backed statistics.
//!
//! Uses the global meter provider, which must be installed by the host
//! application. Without one, the global no-op provider swallows everything.

use opentelemetry::metrics::{Counter, Meter};
use opentelemetry::KeyValue;

use crate::stats::StatsSink;
use crate::types::{CloseReason, Identity};

/// [`StatsSink`] recording gateway counters through OpenTelemetry.
#[derive(Debug, Clone)]
pub struct OtelStats {
    connections_accepted: Counter<u64>,
    sign_ins: Counter<u64>,
    sessions_closed: Counter<u64>,
    messages_dropped: Counter<u64>,
}

impl OtelStats {
    /// Build counters on the global `waddle-session` meter.
    pub fn new() -> Self {
        Self::with_meter(&opentelemetry::global::meter("waddle-session"))
    }

    pub fn with_meter(meter: &Meter) -> Self {
        Self {
            connections_accepted: meter
                .u64_counter("gateway.connections.accepted")
                .with_description("Total transport connections accepted")
                .with_unit("connection")
                .build(),
            sign_ins: meter
                .u64_counter("gateway.sessions.sign_ins")
                .with_description("Total connections promoted to a user identity")
                .with_unit("session")
                .build(),
            sessions_closed: meter
                .u64_counter("gateway.sessions.closed")
                .with_description("Total sessions removed, by reason")
                .with_unit("session")
                .build(),
            messages_dropped: meter
                .u64_counter("gateway.messages.dropped")
                .with_description("Messages that could not be queued for a device")
                .with_unit("message")
                .build(),
        }
    }
}

impl Default for OtelStats {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsSink for OtelStats {
    fn connection_accepted(&self) {
        self.connections_accepted.add(1, &[]);
    }

    fn signed_in(&self, _identity: Identity) {
        self.sign_ins.add(1, &[]);
    }

    fn session_closed(&self, identity: Identity, reason: CloseReason) {
        self.sessions_closed.add(
            1,
            &[
                KeyValue::new("reason", reason.to_string()),
                KeyValue::new("anonymous", identity.is_anonymous()),
            ],
        );
    }

    fn message_dropped(&self, _identity: Identity) {
        self.messages_dropped.add(1, &[]);
    }
}
