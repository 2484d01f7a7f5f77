//! Device registry for the Central role
//!
//! Tracks discovered peripherals keyed by [`DeviceId`], in discovery order.
//! The registry is a plain data structure; the Central facade wraps it in a
//! mutex and drives transport commands from the returned outcomes.

use std::collections::{HashMap, HashSet};

use tracing::debug;
use uuid::Uuid;

use crate::config::DisconnectPolicy;
use crate::device::PeripheralDevice;
use crate::types::{DeviceId, RawPeer};

// ----------------------------------------------------------------------------
// Outcomes
// ----------------------------------------------------------------------------

/// Result of offering a discovered peer to the registry
#[derive(Debug, Clone, PartialEq)]
pub enum Discovery {
    /// First sighting; the caller should connect
    Added(PeripheralDevice),
    /// Already tracked and connected or connecting; nothing to do
    Known,
    /// Already tracked but its link is down; the caller should reconnect
    Returned(PeripheralDevice),
    /// No usable name
    Ignored,
}

/// Result of a characteristic discovery callback
#[derive(Debug, Clone, PartialEq)]
pub enum Readiness {
    /// The device just became ready
    Ready(PeripheralDevice),
    /// A duplicate callback for a device that is already ready
    AlreadyReady,
    /// Some required characteristics are absent
    Missing(Vec<Uuid>),
    /// The device is not in the registry
    Unknown,
}

// ----------------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------------

/// Ordered collection of known peripherals
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<PeripheralDevice>,
    index: HashMap<DeviceId, usize>,
    connecting: HashSet<DeviceId>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle a discovery event
    pub fn on_discovered(&mut self, peer: RawPeer) -> Discovery {
        let device = match PeripheralDevice::from_raw(&peer) {
            Some(device) => device,
            None => {
                debug!("Ignoring peer {} without a usable name", peer.id);
                return Discovery::Ignored;
            }
        };

        let in_flight = self.connecting.contains(&peer.id);
        if let Some(existing) = self.get_mut(&peer.id) {
            if existing.name != device.name {
                debug!("Peer {} renamed to {}", peer.id, device.name);
                existing.name = device.name;
            }
            if existing.connected || in_flight {
                return Discovery::Known;
            }
            let returned = existing.clone();
            self.connecting.insert(peer.id);
            return Discovery::Returned(returned);
        }

        self.index.insert(device.id, self.devices.len());
        self.devices.push(device.clone());
        self.connecting.insert(device.id);
        Discovery::Added(device)
    }

    /// Mark a device connected; returns false for unknown devices
    pub fn on_connected(&mut self, id: &DeviceId) -> bool {
        self.connecting.remove(id);
        match self.get_mut(id) {
            Some(device) => {
                device.mark_connected();
                true
            }
            None => false,
        }
    }

    /// Forget an in-flight connect that failed; the next sighting reconnects
    pub fn on_connect_failed(&mut self, id: &DeviceId) -> Option<PeripheralDevice> {
        if !self.connecting.remove(id) {
            return None;
        }
        self.get(id).cloned()
    }

    /// Drop every in-flight connect, e.g. when the radio powers off
    pub fn abandon_connects(&mut self) -> usize {
        let abandoned = self.connecting.len();
        self.connecting.clear();
        abandoned
    }

    /// Whether a connect to `id` has been issued and not yet resolved
    pub fn is_connecting(&self, id: &DeviceId) -> bool {
        self.connecting.contains(id)
    }

    /// Handle a characteristic discovery callback
    pub fn on_characteristics_ready(
        &mut self,
        id: &DeviceId,
        found: &[Uuid],
        required: &[Uuid],
    ) -> Readiness {
        let Some(device) = self.get_mut(id) else {
            return Readiness::Unknown;
        };
        if device.ready {
            return Readiness::AlreadyReady;
        }

        let missing: Vec<Uuid> = required
            .iter()
            .filter(|uuid| !found.contains(uuid))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Readiness::Missing(missing);
        }

        device.mark_ready();
        Readiness::Ready(device.clone())
    }

    /// Handle a disconnect; returns the device as it was last seen
    pub fn on_disconnected(
        &mut self,
        id: &DeviceId,
        policy: DisconnectPolicy,
    ) -> Option<PeripheralDevice> {
        self.connecting.remove(id);
        match policy {
            DisconnectPolicy::Retain => {
                let device = self.get_mut(id)?;
                device.mark_disconnected();
                Some(device.clone())
            }
            DisconnectPolicy::Prune => {
                let position = self.index.remove(id)?;
                let mut device = self.devices.remove(position);
                self.reindex();
                device.mark_disconnected();
                Some(device)
            }
        }
    }

    fn reindex(&mut self) {
        self.index = self
            .devices
            .iter()
            .enumerate()
            .map(|(position, device)| (device.id, position))
            .collect();
    }

    pub fn get(&self, id: &DeviceId) -> Option<&PeripheralDevice> {
        self.index.get(id).map(|&position| &self.devices[position])
    }

    pub fn get_mut(&mut self, id: &DeviceId) -> Option<&mut PeripheralDevice> {
        match self.index.get(id) {
            Some(&position) => self.devices.get_mut(position),
            None => None,
        }
    }

    /// Known devices in discovery order
    pub fn devices(&self) -> &[PeripheralDevice] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn clear(&mut self) {
        self.devices.clear();
        self.index.clear();
        self.connecting.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ANSWER_CHARACTERISTIC_UUID, QUESTION_CHARACTERISTIC_UUID};

    const REQUIRED: [Uuid; 2] = [QUESTION_CHARACTERISTIC_UUID, ANSWER_CHARACTERISTIC_UUID];

    fn named(name: &str) -> RawPeer {
        RawPeer::new(DeviceId::random(), Some(name.to_string()))
    }

    #[test]
    fn test_duplicate_discovery_keeps_one_entry() {
        let mut registry = DeviceRegistry::new();
        let peer = named("Ball");

        assert!(matches!(registry.on_discovered(peer.clone()), Discovery::Added(_)));
        assert_eq!(registry.on_discovered(peer), Discovery::Known);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_nameless_peers_are_ignored() {
        let mut registry = DeviceRegistry::new();
        let peer = RawPeer::new(DeviceId::random(), Some(" ".into()));
        assert_eq!(registry.on_discovered(peer), Discovery::Ignored);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_rename_refreshes_existing_entry() {
        let mut registry = DeviceRegistry::new();
        let peer = named("Ball");
        registry.on_discovered(peer.clone());
        registry.on_discovered(RawPeer::new(peer.id, Some("Desk Ball".into())));
        assert_eq!(registry.get(&peer.id).unwrap().name, "Desk Ball");
    }

    #[test]
    fn test_characteristics_ready_fires_once() {
        let mut registry = DeviceRegistry::new();
        let peer = named("Ball");
        registry.on_discovered(peer.clone());
        assert!(registry.on_connected(&peer.id));

        let first = registry.on_characteristics_ready(&peer.id, &REQUIRED, &REQUIRED);
        assert!(matches!(first, Readiness::Ready(ref d) if d.is_ready()));
        let second = registry.on_characteristics_ready(&peer.id, &REQUIRED, &REQUIRED);
        assert_eq!(second, Readiness::AlreadyReady);
    }

    #[test]
    fn test_missing_characteristics_are_reported() {
        let mut registry = DeviceRegistry::new();
        let peer = named("Ball");
        registry.on_discovered(peer.clone());

        let readiness = registry.on_characteristics_ready(
            &peer.id,
            &[QUESTION_CHARACTERISTIC_UUID],
            &REQUIRED,
        );
        assert_eq!(readiness, Readiness::Missing(vec![ANSWER_CHARACTERISTIC_UUID]));
        assert_eq!(
            registry.on_characteristics_ready(&DeviceId::random(), &REQUIRED, &REQUIRED),
            Readiness::Unknown
        );
    }

    #[test]
    fn test_disconnect_policies() {
        let mut registry = DeviceRegistry::new();
        let first = named("One");
        let second = named("Two");
        let third = named("Three");
        for peer in [&first, &second, &third] {
            registry.on_discovered(peer.clone());
            registry.on_connected(&peer.id);
        }

        let retained = registry
            .on_disconnected(&first.id, DisconnectPolicy::Retain)
            .unwrap();
        assert!(!retained.connected);
        assert_eq!(registry.len(), 3);
        assert!(matches!(registry.on_discovered(first.clone()), Discovery::Returned(_)));
        assert_eq!(registry.on_discovered(first.clone()), Discovery::Known);

        registry.on_disconnected(&second.id, DisconnectPolicy::Prune);
        assert_eq!(registry.len(), 2);
        assert!(registry.get(&second.id).is_none());
        assert_eq!(registry.get(&third.id).unwrap().name, "Three");
        assert_eq!(registry.devices()[1].id, third.id);
    }

    #[test]
    fn test_failed_connect_allows_reconnect() {
        let mut registry = DeviceRegistry::new();
        let peer = named("Ball");
        assert!(matches!(registry.on_discovered(peer.clone()), Discovery::Added(_)));
        assert_eq!(registry.on_discovered(peer.clone()), Discovery::Known);

        let failed = registry.on_connect_failed(&peer.id).unwrap();
        assert!(!failed.connected);
        assert!(!registry.is_connecting(&peer.id));
        assert_eq!(registry.on_connect_failed(&peer.id), None);

        assert!(matches!(registry.on_discovered(peer.clone()), Discovery::Returned(_)));
        assert_eq!(registry.on_discovered(peer), Discovery::Known);
    }

    #[test]
    fn test_power_loss_abandons_in_flight_connects() {
        let mut registry = DeviceRegistry::new();
        let first = named("One");
        let second = named("Two");
        registry.on_discovered(first.clone());
        registry.on_discovered(second.clone());

        assert_eq!(registry.abandon_connects(), 2);
        assert!(matches!(registry.on_discovered(first), Discovery::Returned(_)));
        assert!(matches!(registry.on_discovered(second), Discovery::Returned(_)));
    }
}
