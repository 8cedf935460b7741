//! Per-user device sets and their read-only snapshots.

use std::collections::HashMap;
use std::sync::Arc;

use crate::session::Session;
use crate::types::Device;

/// Device → session map for one user.
///
/// Performs no locking of its own; only [`SessionRegistry`](super::SessionRegistry)
/// mutates it, inside its critical sections.
#[derive(Default)]
pub struct DeviceSet {
    devices: HashMap<Device, Arc<dyn Session>>,
}

impl DeviceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, returning any session previously held by `device`.
    pub fn put(&mut self, device: Device, session: Arc<dyn Session>) -> Option<Arc<dyn Session>> {
        self.devices.insert(device, session)
    }

    pub fn get(&self, device: Device) -> Option<&Arc<dyn Session>> {
        self.devices.get(&device)
    }

    pub fn remove(&mut self, device: Device) -> Option<Arc<dyn Session>> {
        self.devices.remove(&device)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Device, &Arc<dyn Session>)> {
        self.devices.iter().map(|(device, session)| (*device, session))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Copy the entries out for use after the registry lock is released.
    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            entries: self
                .devices
                .iter()
                .map(|(device, session)| (*device, Arc::clone(session)))
                .collect(),
        }
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = (Device, Arc<dyn Session>)> + '_ {
        self.devices.drain()
    }
}

impl std::fmt::Debug for DeviceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.devices.keys()).finish()
    }
}

/// Immutable point-in-time view of a user's devices.
///
/// Sessions in a snapshot may close after it was taken; delivering to them is
/// then a silent no-op.
#[derive(Default, Clone)]
pub struct DeviceSnapshot {
    entries: Vec<(Device, Arc<dyn Session>)>,
}

impl DeviceSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, device: Device) -> Option<&Arc<dyn Session>> {
        self.entries
            .iter()
            .find(|(d, _)| *d == device)
            .map(|(_, session)| session)
    }

    pub fn devices(&self) -> Vec<Device> {
        self.entries.iter().map(|(device, _)| *device).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Device, &Arc<dyn Session>)> {
        self.entries.iter().map(|(device, session)| (*device, session))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for DeviceSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.devices()).finish()
    }
}
