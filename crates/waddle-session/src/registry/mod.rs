//! Session Registry for multi-device message routing.
//!
//! This module provides the registry that tracks every live session by user
//! identifier and device, enabling fan-out delivery to a user's devices.
//!
//! ## Architecture
//!
//! Each connection registers under a temporary principal when accepted and is
//! moved under its user identifier when it signs in. Deliveries copy a
//! snapshot under the lock and enqueue outside it.
//!
//! ```text
//!                      SessionRegistry
//!   RwLock<HashMap<Principal, DeviceSet>>
//!            |                      |
//!     -7 (temporary)             5 (user)
//!            |                 /        \
//!   unknown -> ClientSession  1 -> ..   2 -> ClientSession
//!                                              |
//!                                        mpsc::Sender -> run loop -> Connection
//! ```

mod devices;
mod session_registry;

pub use devices::{DeviceSet, DeviceSnapshot};
pub use session_registry::{SessionRegistry, SignInOutcome};
