//! Magic 8-Ball SDK core
//!
//! A Central asks questions of nearby 8-Ball peripherals over Bluetooth LE; a
//! Peripheral answers them. This crate holds everything above the radio:
//!
//! - [`observer`] - observer traits and the per-instance observer bus
//! - [`registry`] - discovered peripherals, deduplicated by id
//! - [`session`] - the peripheral's busy/idle state machine
//! - [`exchange`] - question/answer correlation on the Central side
//! - [`central`] and [`peripheral`] - the two role facades
//! - [`transport`] - the adapter contract a radio backend implements
//! - [`wire`] - the characteristic payload format
//! - [`channel`] - redispatch of callbacks onto a channel for UI loops
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use eightball_core::{
//!     create_event_channel, ChannelObserver, ChannelTransport, Role, Sdk, SdkConfig,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (transport, _commands) = ChannelTransport::new();
//! let (_event_tx, event_rx) = create_event_channel();
//!
//! let sdk = Sdk::create_instance(Role::Central, SdkConfig::default(), Arc::new(transport))?;
//! let (observer, _notifications) = ChannelObserver::new(64);
//! if let Some(central) = sdk.as_central() {
//!     central.add_observer(observer);
//! }
//!
//! tokio::spawn(async move { sdk.run(event_rx).await });
//! # Ok(())
//! # }
//! ```

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod answers;
pub mod central;
pub mod channel;
pub mod config;
pub mod device;
pub mod errors;
pub mod exchange;
pub mod observer;
pub mod peripheral;
pub mod protocol;
pub mod registry;
pub mod sdk;
pub mod session;
pub mod transport;
pub mod types;
pub mod wire;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use central::CentralSdk;
pub use channel::{ChannelObserver, ObserverEvent};
pub use config::{DisconnectPolicy, SdkConfig};
pub use device::{CentralDevice, PeripheralDevice};
pub use errors::{EightBallError, ErrorCause, RejectionReason, SdkError, SdkResult, SessionError};
pub use observer::{CentralObserver, Observer, ObserverBus, PeripheralObserver};
pub use peripheral::PeripheralSdk;
pub use protocol::{
    ANSWER_CHARACTERISTIC_UUID, DEFAULT_LOCAL_NAME, EIGHTBALL_SERVICE_UUID,
    QUESTION_CHARACTERISTIC_UUID,
};
pub use registry::{DeviceRegistry, Discovery, Readiness};
pub use sdk::Sdk;
pub use session::{PendingQuestion, Session, SessionEvent, SessionOutcome, SessionState};
pub use transport::{
    create_event_channel, ChannelTransport, TransportAdapter, TransportCommand, TransportEvent,
    TransportEventReceiver, TransportEventSender,
};
pub use types::{DeviceId, ExchangeId, InstanceId, ObserverToken, RawPeer, Role, SdkOrigin, WriteToken};
pub use wire::WireMessage;
