//! Remote device models
//!
//! A Central SDK tracks [`PeripheralDevice`]s; a Peripheral SDK tracks the single
//! [`CentralDevice`] that is talking to it. Observers receive snapshots, so a
//! device handed to a callback never changes underneath it.

use serde::{Deserialize, Serialize};

use crate::errors::EightBallError;
use crate::types::{DeviceId, RawPeer};

// ----------------------------------------------------------------------------
// Peripheral Device (as seen by a Central)
// ----------------------------------------------------------------------------

/// A remote 8-Ball, as seen by a Central
#[derive(Debug, Clone, PartialEq)]
pub struct PeripheralDevice {
    /// Stable transport identifier
    pub id: DeviceId,
    /// Advertised name
    pub name: String,
    /// Last question asked of this device
    pub question: Option<String>,
    /// Answer to `question`, once it arrives
    pub answer: Option<String>,
    /// Last error seen for this device
    pub error: Option<EightBallError>,
    /// Whether the transport link is up
    pub connected: bool,
    /// Whether characteristics have been discovered
    pub ready: bool,
}

impl PeripheralDevice {
    /// Wrap a discovered peer; returns `None` for peers without a usable name
    pub fn from_raw(peer: &RawPeer) -> Option<Self> {
        let name = peer.usable_name()?;
        Some(Self {
            id: peer.id,
            name: name.to_string(),
            question: None,
            answer: None,
            error: None,
            connected: false,
            ready: false,
        })
    }

    /// Start a new exchange: the question is set and the old answer cleared
    pub fn begin_exchange(&mut self, question: &str) {
        self.question = Some(question.to_string());
        self.answer = None;
        self.error = None;
    }

    /// Record a completed exchange; question and answer are set as a unit
    pub fn complete_exchange(&mut self, question: &str, answer: &str) {
        self.question = Some(question.to_string());
        self.answer = Some(answer.to_string());
    }

    /// Check if the device can take questions
    pub fn is_ready(&self) -> bool {
        self.connected && self.ready
    }

    pub fn mark_connected(&mut self) {
        self.connected = true;
    }

    pub fn mark_ready(&mut self) {
        self.ready = true;
    }

    pub fn mark_disconnected(&mut self) {
        self.connected = false;
        self.ready = false;
    }
}

// ----------------------------------------------------------------------------
// Central Device (as seen by a Peripheral)
// ----------------------------------------------------------------------------

/// The Central that is asking this Peripheral questions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CentralDevice {
    pub id: DeviceId,
    pub name: String,
}

impl CentralDevice {
    pub fn from_raw(peer: &RawPeer) -> Self {
        Self {
            id: peer.id,
            name: peer.usable_name().unwrap_or_default().to_string(),
        }
    }

    /// A Central known only by its id (it wrote before announcing itself)
    pub fn anonymous(id: DeviceId) -> Self {
        Self {
            id,
            name: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nameless_peers_are_not_wrapped() {
        let peer = RawPeer::new(DeviceId::random(), None);
        assert!(PeripheralDevice::from_raw(&peer).is_none());
    }

    #[test]
    fn test_exchange_lifecycle() {
        let peer = RawPeer::new(DeviceId::random(), Some("Ball".into()));
        let mut device = PeripheralDevice::from_raw(&peer).unwrap();
        assert!(!device.is_ready());

        device.mark_connected();
        device.mark_ready();
        assert!(device.is_ready());

        device.complete_exchange("Old?", "Yes");
        device.begin_exchange("Will it rain?");
        assert_eq!(device.question.as_deref(), Some("Will it rain?"));
        assert_eq!(device.answer, None);

        device.complete_exchange("Will it rain?", "Outlook good");
        assert_eq!(device.answer.as_deref(), Some("Outlook good"));

        device.mark_disconnected();
        assert!(!device.is_ready());
    }
}
