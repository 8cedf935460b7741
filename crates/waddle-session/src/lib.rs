//! # waddle-session
//!
//! Connection and session core for the Waddle gateway.
//!
//! Tracks every live client connection from the first handshake through
//! authenticated, multi-device sessions, and provides the fan-out primitive
//! other services use to deliver messages to a user's active devices.
//!
//! ## Architecture
//!
//! - **Session**: one task per connection runs a read/deliver loop
//!   ([`ClientSession`]); closing it is idempotent and safe from any task
//! - **Device Set**: per-user map of device to session
//! - **Session Registry**: the only shared mutable state, one lock, with the
//!   sign-in transition as a single critical section
//! - **Session Manager**: facade for connect, sign-in, logout, fan-out and
//!   presence queries
//!
//! Framing and transport, authentication, offline storage and service
//! routing are collaborators supplied by the host application through
//! [`Connection`], [`InboundHandler`], [`IdGenerator`] and [`StatsSink`].

pub mod connection;
pub mod ids;
pub mod manager;
pub mod metrics;
pub mod registry;
pub mod session;
pub mod stats;

mod error;
mod types;

#[cfg(test)]
mod testing;

pub use connection::{Connection, DiscardInbound, InboundHandler};
pub use error::ConnectionError;
pub use ids::{IdGenerator, SequentialIds};
pub use manager::{DeliveryReport, SessionManager, SessionManagerConfig};
pub use metrics::OtelStats;
pub use registry::{DeviceSnapshot, SessionRegistry, SignInOutcome};
pub use session::{ClientSession, EnqueueResult, Session};
pub use stats::{NoopStats, StatsSink};
pub use types::*;
