//! Transport adapter contract
//!
//! The SDK never talks to a radio directly. It issues [`TransportCommand`]s
//! through a [`TransportAdapter`] and consumes [`TransportEvent`]s that the
//! adapter delivers on a channel. Commands must not block: their outcomes
//! (connections, capability discovery, write completions) come back as events.

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::errors::{SdkError, SdkResult};
use crate::types::{DeviceId, RawPeer, WriteToken};

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

/// Requests from the SDK to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    /// Start discovering peers advertising `service`
    ScanForPeers { service: Uuid },
    StopScan,
    Connect { peer: DeviceId },
    Disconnect { peer: DeviceId },
    /// Discover `capabilities` (characteristics) of `service` on a connected peer
    DiscoverCapabilities {
        peer: DeviceId,
        service: Uuid,
        capabilities: Vec<Uuid>,
    },
    /// Write `payload` to a characteristic; completion arrives as `WriteCompleted`
    Write {
        peer: DeviceId,
        capability: Uuid,
        payload: Vec<u8>,
        token: WriteToken,
    },
    /// Start advertising `service` under `local_name`
    Advertise { service: Uuid, local_name: String },
    StopAdvertising,
}

impl TransportCommand {
    pub fn name(&self) -> &'static str {
        match self {
            TransportCommand::ScanForPeers { .. } => "scan",
            TransportCommand::StopScan => "stop-scan",
            TransportCommand::Connect { .. } => "connect",
            TransportCommand::Disconnect { .. } => "disconnect",
            TransportCommand::DiscoverCapabilities { .. } => "discover-capabilities",
            TransportCommand::Write { .. } => "write",
            TransportCommand::Advertise { .. } => "advertise",
            TransportCommand::StopAdvertising => "stop-advertising",
        }
    }
}

// ----------------------------------------------------------------------------
// Events
// ----------------------------------------------------------------------------

/// Notifications from the transport to the SDK
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Radio power changed; scanning and advertising only run while powered on
    PowerStateChanged { powered_on: bool },
    /// A peer advertising the scanned service was seen (may repeat)
    PeerDiscovered { peer: RawPeer },
    /// An outgoing connection completed
    PeerConnected { peer: DeviceId },
    /// An outgoing connection could not be established
    ConnectFailed { peer: DeviceId, cause: String },
    /// Capability discovery finished (may repeat)
    CapabilitiesReady {
        peer: DeviceId,
        capabilities: Vec<Uuid>,
    },
    /// A Central connected to this peripheral
    CentralConnected { central: RawPeer },
    PeerDisconnected { peer: DeviceId },
    /// A remote peer wrote to one of our characteristics
    DataReceived {
        from: DeviceId,
        capability: Uuid,
        payload: Vec<u8>,
    },
    /// Outcome of a `Write` command
    WriteCompleted {
        to: DeviceId,
        token: WriteToken,
        result: Result<(), String>,
    },
    /// The transport failed outside any single write
    TransportFailed { cause: String },
}

pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Create the channel a transport uses to deliver events to one SDK instance
pub fn create_event_channel() -> (TransportEventSender, TransportEventReceiver) {
    mpsc::unbounded_channel()
}

// ----------------------------------------------------------------------------
// Adapter Trait
// ----------------------------------------------------------------------------

/// Capability surface the SDK core consumes
pub trait TransportAdapter: Send + Sync {
    /// Issue a command without blocking
    ///
    /// An error means the command could not be issued at all; failures of an
    /// issued command are reported through events.
    fn execute(&self, command: TransportCommand) -> SdkResult<()>;
}

/// Adapter that forwards commands into a channel
///
/// Useful for tests and for transports that run on their own task.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    sender: mpsc::UnboundedSender<TransportCommand>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransportCommand>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl TransportAdapter for ChannelTransport {
    fn execute(&self, command: TransportCommand) -> SdkResult<()> {
        self.sender.send(command).map_err(|e| {
            SdkError::transport_unavailable(format!("{} dropped: channel closed", e.0.name()))
        })
    }
}
