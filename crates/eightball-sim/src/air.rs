//! The simulated "air": a shared medium every attached radio talks through
//!
//! Links issue [`TransportCommand`]s into one queue. A router task applies
//! them in order against the shared [`AirState`] and delivers the resulting
//! [`TransportEvent`]s to each node's event channel, the way a platform BLE
//! stack would call back into the SDK.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use eightball_core::{
    create_event_channel, DeviceId, RawPeer, Role, TransportCommand, TransportEvent,
    TransportEventSender, WriteToken,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SimConfig;
use crate::error::{SimError, SimResult};
use crate::link::{SimEndpoint, SimLink};

/// A command stamped with the node that issued it
pub(crate) type Envelope = (DeviceId, TransportCommand);

// ----------------------------------------------------------------------------
// Nodes
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct Node {
    name: String,
    role: Role,
    events: TransportEventSender,
    powered: bool,
    advertising: Option<(Uuid, String)>,
    scanning: Option<Uuid>,
    links: BTreeSet<DeviceId>,
}

impl Node {
    fn as_peer(&self, id: DeviceId) -> RawPeer {
        RawPeer::new(id, Some(self.name.clone()))
    }
}

// ----------------------------------------------------------------------------
// Air State
// ----------------------------------------------------------------------------

struct AirState {
    config: SimConfig,
    nodes: HashMap<DeviceId, Node>,
    fail_next: HashSet<DeviceId>,
    rng: fastrand::Rng,
}

impl AirState {
    fn new(config: SimConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        Self {
            config,
            nodes: HashMap::new(),
            fail_next: HashSet::new(),
            rng,
        }
    }

    fn send(&self, to: DeviceId, event: TransportEvent) {
        if let Some(node) = self.nodes.get(&to) {
            if node.events.send(event).is_err() {
                debug!("Node {} stopped listening", to);
            }
        }
    }

    fn linked(&self, a: &DeviceId, b: &DeviceId) -> bool {
        self.nodes.get(a).is_some_and(|node| node.links.contains(b))
    }

    /// The advertisement a powered, advertising peripheral puts on the air
    fn advertisement(&self, id: &DeviceId, service: &Uuid) -> Option<RawPeer> {
        let node = self.nodes.get(id)?;
        match &node.advertising {
            Some((advertised, local_name)) if node.powered && advertised == service => {
                Some(RawPeer::new(*id, Some(local_name.clone())))
            }
            _ => None,
        }
    }

    fn deliver_advertisement(&self, scanner: DeviceId, peer: RawPeer) {
        for _ in 0..=self.config.duplicate_advertisements {
            self.send(scanner, TransportEvent::PeerDiscovered { peer: peer.clone() });
        }
    }

    fn apply(&mut self, from: DeviceId, command: TransportCommand) {
        if !self.nodes.get(&from).is_some_and(|node| node.powered) {
            debug!("Dropping {} from unpowered node {}", command.name(), from);
            match command {
                TransportCommand::Write { peer, token, .. } => {
                    self.complete_write(from, peer, token, Err("radio is powered off".to_string()));
                }
                TransportCommand::Connect { peer } => self.send(
                    from,
                    TransportEvent::ConnectFailed {
                        peer,
                        cause: "radio is powered off".to_string(),
                    },
                ),
                _ => {}
            }
            return;
        }

        match command {
            TransportCommand::ScanForPeers { service } => {
                if let Some(node) = self.nodes.get_mut(&from) {
                    node.scanning = Some(service);
                }
                let visible: Vec<RawPeer> = self
                    .nodes
                    .keys()
                    .filter(|id| **id != from)
                    .filter_map(|id| self.advertisement(id, &service))
                    .collect();
                for peer in visible {
                    self.deliver_advertisement(from, peer);
                }
            }

            TransportCommand::StopScan => {
                if let Some(node) = self.nodes.get_mut(&from) {
                    node.scanning = None;
                }
            }

            TransportCommand::Advertise {
                service,
                local_name,
            } => {
                if let Some(node) = self.nodes.get_mut(&from) {
                    node.advertising = Some((service, local_name));
                }
                let Some(peer) = self.advertisement(&from, &service) else {
                    return;
                };
                let scanners: Vec<DeviceId> = self
                    .nodes
                    .iter()
                    .filter(|(id, node)| {
                        **id != from && node.powered && node.scanning == Some(service)
                    })
                    .map(|(id, _)| *id)
                    .collect();
                for scanner in scanners {
                    self.deliver_advertisement(scanner, peer.clone());
                }
            }

            TransportCommand::StopAdvertising => {
                if let Some(node) = self.nodes.get_mut(&from) {
                    node.advertising = None;
                }
            }

            TransportCommand::Connect { peer } => {
                let reachable = self
                    .nodes
                    .get(&peer)
                    .is_some_and(|node| node.powered && node.advertising.is_some());
                if !reachable {
                    warn!("Connect from {} to unreachable {}", from, peer);
                    self.send(
                        from,
                        TransportEvent::ConnectFailed {
                            peer,
                            cause: format!("{} is not reachable", peer),
                        },
                    );
                    return;
                }
                self.link(from, peer);
                let central = match self.nodes.get(&from) {
                    Some(node) => node.as_peer(from),
                    None => return,
                };
                self.send(from, TransportEvent::PeerConnected { peer });
                self.send(peer, TransportEvent::CentralConnected { central });
            }

            TransportCommand::Disconnect { peer } => {
                if self.unlink(from, peer) {
                    self.send(from, TransportEvent::PeerDisconnected { peer });
                    self.send(peer, TransportEvent::PeerDisconnected { peer: from });
                }
            }

            TransportCommand::DiscoverCapabilities {
                peer,
                service,
                capabilities,
            } => {
                let advertises = self
                    .nodes
                    .get(&peer)
                    .and_then(|node| node.advertising.as_ref())
                    .is_some_and(|(advertised, _)| *advertised == service);
                if !self.linked(&from, &peer) || !advertises {
                    self.send(
                        from,
                        TransportEvent::CapabilitiesReady {
                            peer,
                            capabilities: Vec::new(),
                        },
                    );
                    return;
                }
                for _ in 0..=self.config.duplicate_capability_callbacks {
                    self.send(
                        from,
                        TransportEvent::CapabilitiesReady {
                            peer,
                            capabilities: capabilities.clone(),
                        },
                    );
                }
            }

            TransportCommand::Write {
                peer,
                capability,
                payload,
                token,
            } => {
                if self.fail_next.remove(&from) {
                    self.complete_write(from, peer, token, Err("forced write failure".to_string()));
                    return;
                }
                if !self.linked(&from, &peer) {
                    self.complete_write(from, peer, token, Err(format!("not connected to {}", peer)));
                    return;
                }
                if self.config.failure_rate > 0.0 && self.rng.f64() < self.config.failure_rate {
                    self.complete_write(from, peer, token, Err("simulated write failure".to_string()));
                    return;
                }
                self.complete_write(from, peer, token, Ok(()));
                self.send(
                    peer,
                    TransportEvent::DataReceived {
                        from,
                        capability,
                        payload,
                    },
                );
            }
        }
    }

    fn complete_write(
        &self,
        from: DeviceId,
        to: DeviceId,
        token: WriteToken,
        result: Result<(), String>,
    ) {
        if let Err(cause) = &result {
            debug!("Write {} from {} to {} failed: {}", token, from, to, cause);
        }
        self.send(from, TransportEvent::WriteCompleted { to, token, result });
    }

    fn link(&mut self, a: DeviceId, b: DeviceId) {
        if let Some(node) = self.nodes.get_mut(&a) {
            node.links.insert(b);
        }
        if let Some(node) = self.nodes.get_mut(&b) {
            node.links.insert(a);
        }
    }

    fn unlink(&mut self, a: DeviceId, b: DeviceId) -> bool {
        let removed_a = self
            .nodes
            .get_mut(&a)
            .is_some_and(|node| node.links.remove(&b));
        let removed_b = self
            .nodes
            .get_mut(&b)
            .is_some_and(|node| node.links.remove(&a));
        removed_a || removed_b
    }

    fn set_powered(&mut self, id: DeviceId, powered: bool) -> SimResult<()> {
        let node = self.nodes.get_mut(&id).ok_or(SimError::UnknownNode { id })?;
        node.powered = powered;
        let peers: Vec<DeviceId> = if powered {
            Vec::new()
        } else {
            node.advertising = None;
            node.scanning = None;
            node.links.iter().copied().collect()
        };

        for peer in peers {
            self.unlink(id, peer);
            self.send(id, TransportEvent::PeerDisconnected { peer });
            self.send(peer, TransportEvent::PeerDisconnected { peer: id });
        }
        self.send(id, TransportEvent::PowerStateChanged { powered_on: powered });
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Simulated Air
// ----------------------------------------------------------------------------

/// In-process radio medium shared by any number of Centrals and Peripherals
pub struct SimAir {
    state: Arc<Mutex<AirState>>,
    commands: mpsc::UnboundedSender<Envelope>,
    router: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
    latency: std::time::Duration,
}

impl SimAir {
    pub fn new(config: SimConfig) -> SimResult<Self> {
        config.validate()?;
        let (commands, receiver) = mpsc::unbounded_channel();
        info!(
            "Simulated air created (failure rate {}, seed {:?})",
            config.failure_rate, config.seed
        );
        Ok(Self {
            latency: config.latency,
            state: Arc::new(Mutex::new(AirState::new(config))),
            commands,
            router: Mutex::new(Some(receiver)),
        })
    }

    fn state(&self) -> MutexGuard<'_, AirState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a radio that will act as a Central
    pub fn attach_central<T: Into<String>>(&self, name: T) -> SimEndpoint {
        self.attach(name.into(), Role::Central)
    }

    /// Attach a radio that will act as a Peripheral
    pub fn attach_peripheral<T: Into<String>>(&self, name: T) -> SimEndpoint {
        self.attach(name.into(), Role::Peripheral)
    }

    fn attach(&self, name: String, role: Role) -> SimEndpoint {
        let id = DeviceId::random();
        let (events, receiver) = create_event_channel();
        let mut state = self.state();
        let powered = state.config.start_powered_on;
        debug!("Attaching {} '{}' as {}", role, name, id);
        state.nodes.insert(
            id,
            Node {
                name,
                role,
                events,
                powered,
                advertising: None,
                scanning: None,
                links: BTreeSet::new(),
            },
        );
        if powered {
            state.send(id, TransportEvent::PowerStateChanged { powered_on: true });
        }

        SimEndpoint {
            id,
            link: Arc::new(SimLink::new(id, self.commands.clone())),
            events: receiver,
        }
    }

    /// Start the router task that applies queued commands
    pub fn spawn(&self) -> SimResult<JoinHandle<()>> {
        let mut receiver = self
            .router
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(SimError::AlreadySpawned)?;
        let state = Arc::clone(&self.state);
        let latency = self.latency;

        Ok(tokio::spawn(async move {
            while let Some((from, command)) = receiver.recv().await {
                if !latency.is_zero() {
                    tokio::time::sleep(latency).await;
                }
                state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .apply(from, command);
            }
            debug!("Simulated air router stopped");
        }))
    }

    /// Switch a node's radio on or off; powering off drops its links
    pub fn set_powered(&self, id: DeviceId, powered: bool) -> SimResult<()> {
        self.state().set_powered(id, powered)
    }

    /// Make the next write issued by `id` fail
    pub fn fail_next_write(&self, id: DeviceId) -> SimResult<()> {
        let mut state = self.state();
        if !state.nodes.contains_key(&id) {
            return Err(SimError::UnknownNode { id });
        }
        state.fail_next.insert(id);
        Ok(())
    }

    /// Drop the link between two nodes, notifying both
    pub fn disconnect(&self, a: DeviceId, b: DeviceId) -> bool {
        let mut state = self.state();
        if !state.unlink(a, b) {
            return false;
        }
        state.send(a, TransportEvent::PeerDisconnected { peer: b });
        state.send(b, TransportEvent::PeerDisconnected { peer: a });
        true
    }

    /// Deliver an arbitrary event to a node
    pub fn inject(&self, id: DeviceId, event: TransportEvent) -> SimResult<()> {
        let state = self.state();
        if !state.nodes.contains_key(&id) {
            return Err(SimError::UnknownNode { id });
        }
        state.send(id, event);
        Ok(())
    }

    pub fn is_linked(&self, a: DeviceId, b: DeviceId) -> bool {
        self.state().linked(&a, &b)
    }

    pub fn is_advertising(&self, id: DeviceId) -> bool {
        self.state()
            .nodes
            .get(&id)
            .is_some_and(|node| node.powered && node.advertising.is_some())
    }

    pub fn role_of(&self, id: DeviceId) -> Option<Role> {
        self.state().nodes.get(&id).map(|node| node.role)
    }

    pub fn node_count(&self) -> usize {
        self.state().nodes.len()
    }
}
