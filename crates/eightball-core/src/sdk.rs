//! Role-tagged SDK instance

use std::sync::Arc;

use crate::central::CentralSdk;
use crate::config::SdkConfig;
use crate::errors::{EightBallError, SdkResult};
use crate::peripheral::PeripheralSdk;
use crate::transport::{TransportAdapter, TransportEvent, TransportEventReceiver};
use crate::types::{InstanceId, ObserverToken, Role};

/// An SDK instance playing exactly one role
///
/// Role-specific operations are only reachable through [`Sdk::as_central`]
/// and [`Sdk::as_peripheral`].
#[derive(Clone)]
pub enum Sdk {
    Central(CentralSdk),
    Peripheral(PeripheralSdk),
}

impl Sdk {
    pub fn create_instance(
        role: Role,
        config: SdkConfig,
        transport: Arc<dyn TransportAdapter>,
    ) -> SdkResult<Self> {
        match role {
            Role::Central => CentralSdk::new(config, transport).map(Sdk::Central),
            Role::Peripheral => PeripheralSdk::new(config, transport).map(Sdk::Peripheral),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Sdk::Central(_) => Role::Central,
            Sdk::Peripheral(_) => Role::Peripheral,
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        match self {
            Sdk::Central(sdk) => sdk.instance_id(),
            Sdk::Peripheral(sdk) => sdk.instance_id(),
        }
    }

    pub fn is_powered_on(&self) -> bool {
        match self {
            Sdk::Central(sdk) => sdk.is_powered_on(),
            Sdk::Peripheral(sdk) => sdk.is_powered_on(),
        }
    }

    pub fn last_error(&self) -> Option<EightBallError> {
        match self {
            Sdk::Central(sdk) => sdk.last_error(),
            Sdk::Peripheral(sdk) => sdk.last_error(),
        }
    }

    pub fn remove_observer(&self, token: &ObserverToken) -> bool {
        match self {
            Sdk::Central(sdk) => sdk.remove_observer(token),
            Sdk::Peripheral(sdk) => sdk.remove_observer(token),
        }
    }

    pub fn is_observing(&self, token: &ObserverToken) -> bool {
        match self {
            Sdk::Central(sdk) => sdk.is_observing(token),
            Sdk::Peripheral(sdk) => sdk.is_observing(token),
        }
    }

    pub fn handle_event(&self, event: TransportEvent) {
        match self {
            Sdk::Central(sdk) => sdk.handle_event(event),
            Sdk::Peripheral(sdk) => sdk.handle_event(event),
        }
    }

    pub async fn run(&self, events: TransportEventReceiver) {
        match self {
            Sdk::Central(sdk) => sdk.run(events).await,
            Sdk::Peripheral(sdk) => sdk.run(events).await,
        }
    }

    pub fn shutdown(&self) {
        match self {
            Sdk::Central(sdk) => sdk.shutdown(),
            Sdk::Peripheral(sdk) => sdk.shutdown(),
        }
    }

    pub fn as_central(&self) -> Option<&CentralSdk> {
        match self {
            Sdk::Central(sdk) => Some(sdk),
            Sdk::Peripheral(_) => None,
        }
    }

    pub fn as_peripheral(&self) -> Option<&PeripheralSdk> {
        match self {
            Sdk::Peripheral(sdk) => Some(sdk),
            Sdk::Central(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelTransport;

    #[test]
    fn test_create_instance_by_role() {
        let (transport, _commands) = ChannelTransport::new();
        let transport: Arc<dyn TransportAdapter> = Arc::new(transport);

        let central = Sdk::create_instance(Role::Central, SdkConfig::default(), transport.clone())
            .unwrap();
        assert_eq!(central.role(), Role::Central);
        assert!(central.as_central().is_some());
        assert!(central.as_peripheral().is_none());

        let peripheral =
            Sdk::create_instance(Role::Peripheral, SdkConfig::default(), transport).unwrap();
        assert!(peripheral.as_peripheral().is_some());
        assert_ne!(central.instance_id(), peripheral.instance_id());
    }

    #[test]
    fn test_invalid_config_is_refused() {
        let (transport, _commands) = ChannelTransport::new();
        let config = SdkConfig::default().with_max_text_len(0);
        assert!(Sdk::create_instance(Role::Central, config, Arc::new(transport)).is_err());
    }
}
