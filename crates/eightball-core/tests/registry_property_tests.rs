//! Property-based tests for registry deduplication and observer bus identity

use std::sync::Arc;

use eightball_core::{
    DeviceId, DeviceRegistry, Discovery, DisconnectPolicy, ObserverBus, RawPeer,
};
use proptest::prelude::*;
use uuid::Uuid;

/// Generate a small pool of device ids so sequences contain repeats
fn arb_device_id(pool: &'static [u128]) -> impl Strategy<Value = DeviceId> {
    prop::sample::select(pool).prop_map(|raw| DeviceId::new(Uuid::from_u128(raw)))
}

/// Generate an advertised name, sometimes blank or missing
fn arb_name() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some(String::new())),
        Just(Some("   ".to_string())),
        "[A-Za-z0-9][A-Za-z0-9 -]{0,15}".prop_map(Some),
    ]
}

const POOL: &[u128] = &[1, 2, 3, 4, 5, 6, 7, 8];

fn arb_peer() -> impl Strategy<Value = RawPeer> {
    (arb_device_id(POOL), arb_name()).prop_map(|(id, name)| RawPeer::new(id, name))
}

trait Marker: Send + Sync {}

struct Listener;

impl Marker for Listener {}

proptest! {
    /// Property: every usable id appears exactly once, in first-discovery order
    #[test]
    fn discovery_never_duplicates(peers in prop::collection::vec(arb_peer(), 0..64)) {
        let mut registry = DeviceRegistry::new();
        let mut expected: Vec<DeviceId> = Vec::new();

        for peer in peers {
            let usable = peer.usable_name().is_some();
            let id = peer.id;
            let outcome = registry.on_discovered(peer);

            if !usable {
                prop_assert_eq!(outcome, Discovery::Ignored);
            } else if expected.contains(&id) {
                prop_assert_eq!(outcome, Discovery::Known);
            } else {
                prop_assert!(matches!(outcome, Discovery::Added(_)));
                expected.push(id);
            }
        }

        let ids: Vec<DeviceId> = registry.devices().iter().map(|d| d.id).collect();
        prop_assert_eq!(ids, expected);
    }

    /// Property: pruning keeps lookups consistent with the ordered list
    #[test]
    fn pruning_keeps_index_consistent(
        peers in prop::collection::vec(arb_peer(), 1..32),
        pruned in prop::collection::vec(arb_device_id(POOL), 0..8),
    ) {
        let mut registry = DeviceRegistry::new();
        for peer in peers {
            registry.on_discovered(peer);
        }
        for id in pruned {
            registry.on_disconnected(&id, DisconnectPolicy::Prune);
            prop_assert!(registry.get(&id).is_none());
        }
        for device in registry.devices() {
            prop_assert_eq!(registry.get(&device.id).map(|d| d.id), Some(device.id));
        }
    }

    /// Property: registering the same observer repeatedly keeps one entry
    #[test]
    fn observer_registration_is_idempotent(repeats in 1usize..10, others in 0usize..5) {
        let bus: ObserverBus<dyn Marker> = ObserverBus::new();
        let observer: Arc<dyn Marker> = Arc::new(Listener);

        let token = bus.register(Arc::clone(&observer));
        prop_assert!(token.is_some());
        for _ in 1..repeats {
            prop_assert!(bus.register(Arc::clone(&observer)).is_none());
        }
        for _ in 0..others {
            prop_assert!(bus.register(Arc::new(Listener) as Arc<dyn Marker>).is_some());
        }
        prop_assert_eq!(bus.len(), 1 + others);

        let token = token.unwrap();
        prop_assert!(bus.unregister(&token));
        prop_assert!(!bus.is_registered(&token));
        prop_assert!(!bus.contains(&observer));
    }
}
