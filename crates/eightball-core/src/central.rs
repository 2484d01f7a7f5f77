//! Central role facade
//!
//! A [`CentralSdk`] scans for 8-Ball peripherals, connects to every named
//! peer it sees, discovers the question and answer characteristics, and then
//! lets the application ask questions. Transport events are fed in through
//! [`CentralSdk::handle_event`] (or the [`CentralSdk::run`] loop) and turned
//! into registry updates, exchange bookkeeping and observer notifications.
//!
//! Every question accepted by [`CentralSdk::send_question`] ends in exactly one
//! notification: `question_answered_by_device` or `error_occurred`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::SdkConfig;
use crate::device::PeripheralDevice;
use crate::errors::{EightBallError, ErrorCause, SdkError, SdkResult};
use crate::exchange::{ExchangeBook, PendingExchange};
use crate::observer::{CentralObserver, ObserverBus};
use crate::registry::{DeviceRegistry, Discovery, Readiness};
use crate::transport::{TransportAdapter, TransportCommand, TransportEvent, TransportEventReceiver};
use crate::types::{DeviceId, ExchangeId, InstanceId, ObserverToken, Role, SdkOrigin, WriteToken};
use crate::wire::{validate_text, WireMessage};

// ----------------------------------------------------------------------------
// Internal State
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CentralState {
    registry: DeviceRegistry,
    exchanges: ExchangeBook,
    powered_on: bool,
    scanning: bool,
    last_error: Option<EightBallError>,
    shut_down: bool,
}

/// Notifications computed under the state lock and delivered after it is released
enum Notice {
    Discovered(PeripheralDevice),
    Disconnected(PeripheralDevice),
    Asked(PeripheralDevice),
    Answered(PeripheralDevice),
    Failed(EightBallError),
}

struct CentralInner {
    origin: SdkOrigin,
    config: SdkConfig,
    transport: Arc<dyn TransportAdapter>,
    observers: ObserverBus<dyn CentralObserver>,
    state: Mutex<CentralState>,
    next_token: AtomicU64,
    shutdown: watch::Sender<bool>,
}

// ----------------------------------------------------------------------------
// Central SDK
// ----------------------------------------------------------------------------

/// Central-role SDK instance; cheap to clone, clones share state
#[derive(Clone)]
pub struct CentralSdk {
    inner: Arc<CentralInner>,
}

impl CentralSdk {
    pub fn new(config: SdkConfig, transport: Arc<dyn TransportAdapter>) -> SdkResult<Self> {
        config.validate()?;
        let origin = SdkOrigin {
            instance: InstanceId::generate(),
            role: Role::Central,
        };
        let (shutdown, _) = watch::channel(false);
        info!("Central SDK {} created", origin.instance);

        Ok(Self {
            inner: Arc::new(CentralInner {
                origin,
                config,
                transport,
                observers: ObserverBus::new(),
                state: Mutex::new(CentralState::default()),
                next_token: AtomicU64::new(1),
                shutdown,
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, CentralState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn instance_id(&self) -> InstanceId {
        self.inner.origin.instance
    }

    pub fn origin(&self) -> SdkOrigin {
        self.inner.origin
    }

    pub fn config(&self) -> &SdkConfig {
        &self.inner.config
    }

    pub fn is_powered_on(&self) -> bool {
        self.state().powered_on
    }

    pub fn is_shut_down(&self) -> bool {
        self.state().shut_down
    }

    /// The most recent error broadcast by this instance
    pub fn last_error(&self) -> Option<EightBallError> {
        self.state().last_error.clone()
    }

    // ------------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------------

    /// Register an observer; `None` if it is already registered or the SDK is shut down
    pub fn add_observer(&self, observer: Arc<dyn CentralObserver>) -> Option<ObserverToken> {
        if self.is_shut_down() {
            debug!("Ignoring observer registration on shut down Central");
            return None;
        }
        self.inner.observers.register(observer)
    }

    pub fn remove_observer(&self, token: &ObserverToken) -> bool {
        self.inner.observers.unregister(token)
    }

    pub fn is_observing(&self, token: &ObserverToken) -> bool {
        self.inner.observers.is_registered(token)
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.len()
    }

    // ------------------------------------------------------------------------
    // Devices
    // ------------------------------------------------------------------------

    /// Snapshot of known peripherals in discovery order
    pub fn devices(&self) -> Vec<PeripheralDevice> {
        self.state().registry.devices().to_vec()
    }

    pub fn device(&self, id: &DeviceId) -> Option<PeripheralDevice> {
        self.state().registry.get(id).cloned()
    }

    /// Number of questions still waiting for an outcome
    pub fn pending_exchanges(&self) -> usize {
        self.state().exchanges.len()
    }

    // ------------------------------------------------------------------------
    // Asking
    // ------------------------------------------------------------------------

    /// Ask `text` of a ready peripheral
    ///
    /// Returns once the write is issued. The outcome is broadcast later as
    /// either `question_answered_by_device` or `error_occurred`.
    pub fn send_question(&self, device: &DeviceId, text: &str) -> SdkResult<ExchangeId> {
        let max_len = self.inner.config.max_text_len;
        let token = WriteToken::new(self.inner.next_token.fetch_add(1, Ordering::Relaxed));

        let (exchange, payload, snapshot, in_flight) = {
            let mut state = self.state();
            if state.shut_down {
                return Err(SdkError::ShutDown);
            }
            validate_text(text, max_len)?;

            let ready = state
                .registry
                .get(device)
                .map(PeripheralDevice::is_ready)
                .ok_or(SdkError::UnknownDevice { device: *device })?;
            if !ready {
                return Err(SdkError::DeviceNotReady { device: *device });
            }

            // The peripheral declines a second question; the device keeps showing the first
            let in_flight = state.exchanges.pending_for(device) > 0;
            let exchange = state.exchanges.open(*device, text, token);
            let message = WireMessage::Question {
                exchange,
                text: text.to_string(),
            };
            let payload = match message.encode(max_len) {
                Ok(payload) => payload,
                Err(e) => {
                    state.exchanges.complete(exchange);
                    return Err(e);
                }
            };

            let snapshot = match state.registry.get_mut(device) {
                Some(target) => {
                    if !in_flight {
                        target.begin_exchange(text);
                    }
                    target.clone()
                }
                None => {
                    state.exchanges.complete(exchange);
                    return Err(SdkError::UnknownDevice { device: *device });
                }
            };
            (exchange, payload, snapshot, in_flight)
        };

        if in_flight {
            debug!(
                "{} already has a question in flight, {} will be declined",
                snapshot.name, exchange
            );
        } else {
            debug!("Asking {} ({}): {}", snapshot.name, exchange, text);
            self.emit(vec![Notice::Asked(snapshot)]);
        }

        let command = TransportCommand::Write {
            peer: *device,
            capability: self.inner.config.question_characteristic,
            payload,
            token,
        };
        if let Err(e) = self.inner.transport.execute(command) {
            warn!("Question write for {} could not be issued: {}", exchange, e);
            self.fail_write(token, e.to_string());
        }
        Ok(exchange)
    }

    // ------------------------------------------------------------------------
    // Transport Events
    // ------------------------------------------------------------------------

    /// Process one transport event
    pub fn handle_event(&self, event: TransportEvent) {
        let mut notices = Vec::new();
        let mut commands = Vec::new();
        {
            let mut state = self.state();
            if state.shut_down {
                debug!("Central shut down, dropping {:?}", event);
                return;
            }
            self.apply_event(&mut state, event, &mut notices, &mut commands);
        }
        self.emit(notices);
        self.issue(commands);
    }

    fn apply_event(
        &self,
        state: &mut CentralState,
        event: TransportEvent,
        notices: &mut Vec<Notice>,
        commands: &mut Vec<TransportCommand>,
    ) {
        let config = &self.inner.config;
        match event {
            TransportEvent::PowerStateChanged { powered_on } => {
                state.powered_on = powered_on;
                if powered_on && !state.scanning {
                    info!("Radio powered on, scanning for {}", config.service_uuid);
                    state.scanning = true;
                    commands.push(TransportCommand::ScanForPeers {
                        service: config.service_uuid,
                    });
                } else if !powered_on {
                    info!("Radio powered off");
                    state.scanning = false;
                    let abandoned = state.registry.abandon_connects();
                    if abandoned > 0 {
                        debug!("Abandoned {} in-flight connects", abandoned);
                    }
                }
            }

            TransportEvent::PeerDiscovered { peer } => {
                match state.registry.on_discovered(peer) {
                    Discovery::Added(device) => {
                        info!("Discovered {} ({}), connecting", device.name, device.id);
                        commands.push(TransportCommand::Connect { peer: device.id });
                    }
                    Discovery::Returned(device) => {
                        info!("{} is back in range, reconnecting", device.name);
                        commands.push(TransportCommand::Connect { peer: device.id });
                    }
                    Discovery::Known | Discovery::Ignored => {}
                }
            }

            TransportEvent::PeerConnected { peer } => {
                if state.registry.on_connected(&peer) {
                    debug!("Connected to {}, discovering characteristics", peer);
                    commands.push(TransportCommand::DiscoverCapabilities {
                        peer,
                        service: config.service_uuid,
                        capabilities: config.required_characteristics().to_vec(),
                    });
                } else {
                    debug!("Connection from unknown peer {} ignored", peer);
                }
            }

            TransportEvent::ConnectFailed { peer, cause } => {
                match state.registry.on_connect_failed(&peer) {
                    Some(device) => {
                        warn!("Connecting to {} failed: {}", device.name, cause);
                        let error = EightBallError::bluetooth(format!(
                            "connect to {} failed: {}",
                            device.name, cause
                        ));
                        if let Some(device) = state.registry.get_mut(&peer) {
                            device.error = Some(error.clone());
                        }
                        Self::record(state, error, notices);
                    }
                    None => {
                        debug!("Connect failure for {} with no connect in flight", peer);
                    }
                }
            }

            TransportEvent::CapabilitiesReady { peer, capabilities } => {
                let required = config.required_characteristics();
                match state
                    .registry
                    .on_characteristics_ready(&peer, &capabilities, &required)
                {
                    Readiness::Ready(device) => {
                        info!("{} is ready for questions", device.name);
                        notices.push(Notice::Discovered(device));
                    }
                    Readiness::AlreadyReady => {
                        debug!("Duplicate characteristic callback for {} suppressed", peer);
                    }
                    Readiness::Missing(missing) => {
                        warn!("{} lacks characteristics {:?}", peer, missing);
                        let error = EightBallError::bluetooth(format!(
                            "missing characteristics on {}",
                            peer
                        ));
                        if let Some(device) = state.registry.get_mut(&peer) {
                            device.error = Some(error.clone());
                        }
                        Self::record(state, error, notices);
                    }
                    Readiness::Unknown => {
                        debug!("Characteristics for unknown peer {} ignored", peer);
                    }
                }
            }

            TransportEvent::PeerDisconnected { peer } => {
                for pending in state.exchanges.fail_device(&peer) {
                    let error = EightBallError::send_failed(format!(
                        "{} disconnected before answering",
                        peer
                    ));
                    Self::fail_exchange(state, pending, error, notices);
                }
                if let Some(device) = state
                    .registry
                    .on_disconnected(&peer, config.disconnect_policy)
                {
                    info!("{} disconnected", device.name);
                    notices.push(Notice::Disconnected(device));
                }
            }

            TransportEvent::DataReceived {
                from,
                capability,
                payload,
            } => {
                if capability != config.answer_characteristic {
                    debug!("Ignoring write from {} to {}", from, capability);
                    return;
                }
                match WireMessage::decode(&payload, config.max_text_len) {
                    Ok(message) => self.apply_reply(state, from, message, notices),
                    Err(e) => {
                        warn!("Undecodable reply from {}: {}", from, e);
                        let error = EightBallError::Unknown(Some(
                            ErrorCause::diagnostic(e.to_string()),
                        ));
                        Self::record(state, error, notices);
                    }
                }
            }

            TransportEvent::WriteCompleted { to, token, result } => match result {
                Ok(()) => {
                    if !state.exchanges.mark_written(token) {
                        debug!("Write {} to {} completed for a closed exchange", token, to);
                    }
                }
                Err(cause) => {
                    if let Some(pending) = state.exchanges.write_failed(token) {
                        warn!("Question write {} to {} failed: {}", token, to, cause);
                        Self::fail_exchange(
                            state,
                            pending,
                            EightBallError::send_failed(cause),
                            notices,
                        );
                    }
                }
            },

            TransportEvent::CentralConnected { central } => {
                debug!("Central role ignores incoming connection from {}", central.id);
            }

            TransportEvent::TransportFailed { cause } => {
                error!("Transport failure: {}", cause);
                Self::record(state, EightBallError::bluetooth(cause), notices);
            }
        }
    }

    fn apply_reply(
        &self,
        state: &mut CentralState,
        from: DeviceId,
        message: WireMessage,
        notices: &mut Vec<Notice>,
    ) {
        let exchange = message.exchange();
        match state.exchanges.get(&exchange) {
            Some(pending) if pending.device == from => {}
            Some(_) => {
                warn!("Reply for {} arrived from the wrong device {}", exchange, from);
                return;
            }
            None => {
                debug!("Late reply for closed exchange {} from {}", exchange, from);
                return;
            }
        }

        match message {
            WireMessage::Answer {
                text, to_question, ..
            } => {
                let Some(pending) = state.exchanges.complete(exchange) else {
                    return;
                };
                if pending.question != to_question {
                    let error = EightBallError::Unknown(Some(
                        ErrorCause::diagnostic(format!(
                            "answer to '{}' does not match question '{}'",
                            to_question, pending.question
                        )),
                    ));
                    Self::fail_exchange(state, pending, error, notices);
                    return;
                }
                if let Some(device) = state.registry.get_mut(&from) {
                    device.complete_exchange(&pending.question, &text);
                    debug!("{} answered {}: {}", device.name, exchange, text);
                    notices.push(Notice::Answered(device.clone()));
                }
            }
            WireMessage::Rejected { reason, .. } => {
                if let Some(pending) = state.exchanges.reject(exchange) {
                    warn!("{} rejected {}: {}", from, exchange, reason);
                    Self::fail_exchange(state, pending, EightBallError::rejected(reason), notices);
                }
            }
            WireMessage::Question { .. } => {
                debug!("Central ignores question from {}", from);
            }
        }
    }

    fn fail_exchange(
        state: &mut CentralState,
        pending: PendingExchange,
        error: EightBallError,
        notices: &mut Vec<Notice>,
    ) {
        if state.exchanges.pending_for(&pending.device) == 0 {
            if let Some(device) = state.registry.get_mut(&pending.device) {
                device.error = Some(error.clone());
            }
        }
        Self::record(state, error, notices);
    }

    fn record(state: &mut CentralState, error: EightBallError, notices: &mut Vec<Notice>) {
        state.last_error = Some(error.clone());
        notices.push(Notice::Failed(error));
    }

    fn fail_write(&self, token: WriteToken, cause: String) {
        let mut notices = Vec::new();
        {
            let mut state = self.state();
            if let Some(pending) = state.exchanges.write_failed(token) {
                Self::fail_exchange(
                    &mut state,
                    pending,
                    EightBallError::send_failed(cause),
                    &mut notices,
                );
            }
        }
        self.emit(notices);
    }

    // ------------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------------

    /// Fail exchanges older than the answer timeout; returns how many expired
    pub fn expire_pending(&self, now: Instant) -> usize {
        let Some(timeout) = self.inner.config.answer_timeout else {
            return 0;
        };
        let mut notices = Vec::new();
        {
            let mut state = self.state();
            for pending in state.exchanges.expire(now, timeout) {
                warn!("{} timed out waiting for an answer", pending.id);
                let error = EightBallError::send_failed(format!(
                    "timed out after {:?} waiting for an answer",
                    timeout
                ));
                Self::fail_exchange(&mut state, pending, error, &mut notices);
            }
        }
        let expired = notices.len();
        self.emit(notices);
        expired
    }

    /// Drive the SDK from a transport event channel until it closes or the SDK shuts down
    pub async fn run(&self, mut events: TransportEventReceiver) {
        let mut shutdown = self.inner.shutdown.subscribe();
        let mut maintenance = tokio::time::interval(self.inner.config.maintenance_interval);
        maintenance.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!("Central {} event loop started", self.inner.origin.instance);
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        info!("Transport event channel closed");
                        break;
                    }
                },
                _ = maintenance.tick() => {
                    self.expire_pending(Instant::now());
                }
                _ = shutdown.changed() => {}
            }
        }
        info!("Central {} event loop stopped", self.inner.origin.instance);
    }

    // ------------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------------

    /// Stop scanning, disconnect, fail every pending exchange and drop all observers
    pub fn shutdown(&self) {
        let mut notices = Vec::new();
        let mut commands = Vec::new();
        {
            let mut state = self.state();
            if state.shut_down {
                return;
            }
            state.shut_down = true;

            for pending in state.exchanges.drain() {
                let error = EightBallError::send_failed("SDK shut down before an answer arrived");
                Self::fail_exchange(&mut state, pending, error, &mut notices);
            }
            if state.scanning {
                state.scanning = false;
                commands.push(TransportCommand::StopScan);
            }
            commands.extend(
                state
                    .registry
                    .devices()
                    .iter()
                    .filter(|device| device.connected)
                    .map(|device| TransportCommand::Disconnect { peer: device.id }),
            );
        }

        self.emit(notices);
        self.inner.observers.clear();
        for command in commands {
            if let Err(e) = self.inner.transport.execute(command) {
                debug!("Ignoring transport error during shutdown: {}", e);
            }
        }
        self.inner.shutdown.send_replace(true);
        info!("Central SDK {} shut down", self.inner.origin.instance);
    }

    // ------------------------------------------------------------------------
    // Delivery
    // ------------------------------------------------------------------------

    fn issue(&self, commands: Vec<TransportCommand>) {
        for command in commands {
            let name = command.name();
            let connecting = match &command {
                TransportCommand::Connect { peer } => Some(*peer),
                _ => None,
            };
            if let Err(e) = self.inner.transport.execute(command) {
                error!("Transport rejected {}: {}", name, e);
                let mut notices = Vec::new();
                {
                    let mut state = self.state();
                    if let Some(peer) = connecting {
                        state.registry.on_connect_failed(&peer);
                    }
                    Self::record(
                        &mut state,
                        EightBallError::bluetooth(e.to_string()),
                        &mut notices,
                    );
                }
                self.emit(notices);
            }
        }
    }

    fn emit(&self, notices: Vec<Notice>) {
        let origin = &self.inner.origin;
        for notice in notices {
            match notice {
                Notice::Discovered(device) => {
                    self.inner
                        .observers
                        .notify_all(|o| o.device_discovered(&device, origin));
                }
                Notice::Disconnected(device) => {
                    self.inner
                        .observers
                        .notify_all(|o| o.device_disconnected(&device, origin));
                }
                Notice::Asked(device) => {
                    self.inner
                        .observers
                        .notify_all(|o| o.question_asked_of_device(&device, origin));
                }
                Notice::Answered(device) => {
                    self.inner
                        .observers
                        .notify_all(|o| o.question_answered_by_device(&device, origin));
                }
                Notice::Failed(error) => {
                    self.inner
                        .observers
                        .notify_all(|o| o.error_occurred(&error, origin));
                }
            }
        }
    }
}
