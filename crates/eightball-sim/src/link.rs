//! Per-node transport adapter handed to an SDK instance

use eightball_core::{
    DeviceId, SdkError, SdkResult, TransportAdapter, TransportCommand, TransportEventReceiver,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

use crate::air::Envelope;

/// A radio's connection to the simulated air
#[derive(Debug)]
pub struct SimLink {
    id: DeviceId,
    sender: mpsc::UnboundedSender<Envelope>,
}

impl SimLink {
    pub(crate) fn new(id: DeviceId, sender: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { id, sender }
    }

    /// The id other nodes see this radio as
    pub fn id(&self) -> DeviceId {
        self.id
    }
}

impl TransportAdapter for SimLink {
    fn execute(&self, command: TransportCommand) -> SdkResult<()> {
        trace!("{} issues {}", self.id, command.name());
        self.sender.send((self.id, command)).map_err(|e| {
            SdkError::transport_unavailable(format!(
                "{} dropped: simulated air is gone",
                e.0 .1.name()
            ))
        })
    }
}

/// Everything needed to run one SDK instance on the simulated air
#[derive(Debug)]
pub struct SimEndpoint {
    pub id: DeviceId,
    pub link: Arc<SimLink>,
    pub events: TransportEventReceiver,
}

impl SimEndpoint {
    pub fn into_parts(self) -> (DeviceId, Arc<SimLink>, TransportEventReceiver) {
        (self.id, self.link, self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_air_is_unavailable() {
        let (sender, receiver) = mpsc::unbounded_channel();
        let link = SimLink::new(DeviceId::random(), sender);
        drop(receiver);

        let err = link.execute(TransportCommand::StopScan).unwrap_err();
        assert!(matches!(err, SdkError::TransportUnavailable { .. }));
    }

    #[test]
    fn test_commands_carry_the_sender_id() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let link = SimLink::new(DeviceId::random(), sender);
        link.execute(TransportCommand::StopAdvertising).unwrap();

        let (from, command) = receiver.try_recv().unwrap();
        assert_eq!(from, link.id());
        assert_eq!(command, TransportCommand::StopAdvertising);
    }
}
