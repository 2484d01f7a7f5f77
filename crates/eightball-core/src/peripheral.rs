//! Peripheral role facade
//!
//! A [`PeripheralSdk`] advertises the 8-Ball service once the radio is powered
//! on and answers the questions a Central writes to it. It holds one
//! [`Session`]: a question that arrives while another is being worked on is
//! declined with [`RejectionReason::DeviceBusy`] and never reaches observers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::SdkConfig;
use crate::device::CentralDevice;
use crate::errors::{EightBallError, ErrorCause, RejectionReason, SdkError, SdkResult};
use crate::observer::{ObserverBus, PeripheralObserver};
use crate::session::{PendingQuestion, Session, SessionEvent, SessionOutcome, SessionState};
use crate::transport::{TransportAdapter, TransportCommand, TransportEvent, TransportEventReceiver};
use crate::types::{DeviceId, ExchangeId, InstanceId, ObserverToken, Role, SdkOrigin, WriteToken};
use crate::wire::{validate_text, WireMessage};

// ----------------------------------------------------------------------------
// Internal State
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PeripheralState {
    session: Session,
    central: Option<CentralDevice>,
    powered_on: bool,
    advertising: bool,
    last_error: Option<EightBallError>,
    shut_down: bool,
}

impl PeripheralState {
    fn is_answering(&self) -> bool {
        matches!(self.session.state(), SessionState::Answering { .. })
    }
}

enum Notice {
    CentralConnected(CentralDevice),
    Asked {
        central: CentralDevice,
        question: String,
    },
    AnswerSent {
        central: CentralDevice,
        answer: String,
        question: String,
    },
    Failed(EightBallError),
}

struct PeripheralInner {
    origin: SdkOrigin,
    config: SdkConfig,
    transport: Arc<dyn TransportAdapter>,
    observers: ObserverBus<dyn PeripheralObserver>,
    state: Mutex<PeripheralState>,
    next_token: AtomicU64,
    shutdown: watch::Sender<bool>,
}

// ----------------------------------------------------------------------------
// Peripheral SDK
// ----------------------------------------------------------------------------

/// Peripheral-role SDK instance; cheap to clone, clones share state
#[derive(Clone)]
pub struct PeripheralSdk {
    inner: Arc<PeripheralInner>,
}

impl PeripheralSdk {
    pub fn new(config: SdkConfig, transport: Arc<dyn TransportAdapter>) -> SdkResult<Self> {
        config.validate()?;
        let origin = SdkOrigin {
            instance: InstanceId::generate(),
            role: Role::Peripheral,
        };
        let (shutdown, _) = watch::channel(false);
        info!(
            "Peripheral SDK {} created as '{}'",
            origin.instance, config.local_name
        );

        Ok(Self {
            inner: Arc::new(PeripheralInner {
                origin,
                config,
                transport,
                observers: ObserverBus::new(),
                state: Mutex::new(PeripheralState::default()),
                next_token: AtomicU64::new(1),
                shutdown,
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, PeripheralState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn next_token(&self) -> WriteToken {
        WriteToken::new(self.inner.next_token.fetch_add(1, Ordering::Relaxed))
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

    pub fn is_advertising(&self) -> bool {
        self.state().advertising
    }

    pub fn is_shut_down(&self) -> bool {
        self.state().shut_down
    }

    pub fn last_error(&self) -> Option<EightBallError> {
        self.state().last_error.clone()
    }

    // ------------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------------

    pub fn add_observer(&self, observer: Arc<dyn PeripheralObserver>) -> Option<ObserverToken> {
        if self.is_shut_down() {
            debug!("Ignoring observer registration on shut down Peripheral");
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
    // Session
    // ------------------------------------------------------------------------

    /// The Central currently talking to this peripheral
    pub fn central(&self) -> Option<CentralDevice> {
        self.state().central.clone()
    }

    pub fn session_state(&self) -> SessionState {
        self.state().session.state().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.state().session.is_busy()
    }

    pub fn pending_question(&self) -> Option<PendingQuestion> {
        self.state().session.pending().cloned()
    }

    /// Answer the pending question
    ///
    /// `to_question` must match the question being worked on. The outcome is
    /// broadcast later as `answer_sent_to_device` or `error_occurred`.
    pub fn send_answer(&self, answer: &str, to_question: &str) -> SdkResult<()> {
        let max_len = self.inner.config.max_text_len;
        let token = self.next_token();

        let (central, payload) = {
            let mut state = self.state();
            if state.shut_down {
                return Err(SdkError::ShutDown);
            }
            validate_text(answer, max_len)?;
            let pending = state
                .session
                .pending()
                .cloned()
                .ok_or(SdkError::NoPendingQuestion)?;

            let message = WireMessage::Answer {
                exchange: pending.exchange,
                text: answer.to_string(),
                to_question: to_question.to_string(),
            };
            let payload = message.encode(max_len)?;
            state.session.apply(SessionEvent::AnswerIssued {
                answer: answer.to_string(),
                to_question: to_question.to_string(),
                token,
            })?;
            (pending.central, payload)
        };

        debug!("Answering {} with '{}'", central.id, answer);
        let command = TransportCommand::Write {
            peer: central.id,
            capability: self.inner.config.answer_characteristic,
            payload,
            token,
        };
        if let Err(e) = self.inner.transport.execute(command) {
            warn!("Answer write could not be issued: {}", e);
            self.handle_event(TransportEvent::WriteCompleted {
                to: central.id,
                token,
                result: Err(e.to_string()),
            });
        }
        Ok(())
    }

    /// Decline the pending question and return to idle
    pub fn reject_question(&self, reason: RejectionReason) -> SdkResult<()> {
        let pending = {
            let mut state = self.state();
            if state.shut_down {
                return Err(SdkError::ShutDown);
            }
            if !matches!(state.session.state(), SessionState::Busy(_)) {
                return Err(SdkError::NoPendingQuestion);
            }
            match state.session.apply(SessionEvent::Rejected)? {
                SessionOutcome::Declined(pending) => pending,
                _ => return Err(SdkError::NoPendingQuestion),
            }
        };

        info!("Declining {} from {}: {}", pending.exchange, pending.central.id, reason);
        self.send_rejection(pending.central.id, pending.exchange, reason)
    }

    /// Force the session back to idle, returning the question that was pending
    pub fn reset_session(&self) -> Option<PendingQuestion> {
        let mut notices = Vec::new();
        let cleared = {
            let mut state = self.state();
            let answering = state.is_answering();
            match state.session.apply(SessionEvent::Reset) {
                Ok(SessionOutcome::Cleared(pending)) => {
                    if answering {
                        Self::record(
                            &mut state,
                            EightBallError::send_failed("session reset before the answer was delivered"),
                            &mut notices,
                        );
                    }
                    pending
                }
                Ok(_) => None,
                Err(e) => {
                    warn!("Session reset refused: {}", e);
                    None
                }
            }
        };
        if let Some(pending) = &cleared {
            info!("Session reset, dropped {}", pending.exchange);
        }
        self.emit(notices);
        cleared
    }

    fn send_rejection(
        &self,
        to: DeviceId,
        exchange: ExchangeId,
        reason: RejectionReason,
    ) -> SdkResult<()> {
        let message = WireMessage::Rejected { exchange, reason };
        let payload = message.encode(self.inner.config.max_text_len)?;
        self.inner.transport.execute(TransportCommand::Write {
            peer: to,
            capability: self.inner.config.answer_characteristic,
            payload,
            token: self.next_token(),
        })
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
                debug!("Peripheral shut down, dropping {:?}", event);
                return;
            }
            self.apply_event(&mut state, event, &mut notices, &mut commands);
        }
        self.emit(notices);
        self.issue(commands);
    }

    fn apply_event(
        &self,
        state: &mut PeripheralState,
        event: TransportEvent,
        notices: &mut Vec<Notice>,
        commands: &mut Vec<TransportCommand>,
    ) {
        let config = &self.inner.config;
        match event {
            TransportEvent::PowerStateChanged { powered_on } => {
                state.powered_on = powered_on;
                if powered_on && !state.advertising {
                    info!("Radio powered on, advertising as '{}'", config.local_name);
                    state.advertising = true;
                    commands.push(TransportCommand::Advertise {
                        service: config.service_uuid,
                        local_name: config.local_name.clone(),
                    });
                } else if !powered_on {
                    info!("Radio powered off");
                    state.advertising = false;
                }
            }

            TransportEvent::CentralConnected { central } => {
                let central = CentralDevice::from_raw(&central);
                info!("Central {} connected", central.id);
                match state.session.pending().map(|pending| pending.central.id) {
                    Some(serving) if serving != central.id => {
                        debug!("Still answering {}, keeping it as the central", serving);
                    }
                    _ => state.central = Some(central.clone()),
                }
                notices.push(Notice::CentralConnected(central));
            }

            TransportEvent::DataReceived {
                from,
                capability,
                payload,
            } => {
                if capability != config.question_characteristic {
                    debug!("Ignoring write from {} to {}", from, capability);
                    return;
                }
                match WireMessage::decode(&payload, config.max_text_len) {
                    Ok(WireMessage::Question { exchange, text }) => {
                        self.accept_question(state, from, exchange, text, notices, commands);
                    }
                    Ok(other) => {
                        debug!("Peripheral ignores {:?} from {}", other, from);
                    }
                    Err(e) => {
                        warn!("Undecodable question from {}: {}", from, e);
                        let error = EightBallError::Unknown(Some(ErrorCause::diagnostic(
                            e.to_string(),
                        )));
                        Self::record(state, error, notices);
                    }
                }
            }

            TransportEvent::WriteCompleted { to, token, result } => {
                let event = match &result {
                    Ok(()) => SessionEvent::AnswerDelivered { token },
                    Err(_) => SessionEvent::AnswerFailed {
                        token,
                        reset: config.reset_session_on_error,
                    },
                };
                match state.session.apply(event) {
                    Ok(SessionOutcome::Delivered { question, answer }) => {
                        info!("Answer delivered to {}", to);
                        notices.push(Notice::AnswerSent {
                            central: question.central,
                            answer,
                            question: question.question,
                        });
                    }
                    Ok(SessionOutcome::Failed { reset, .. }) => {
                        let cause = result.err().unwrap_or_default();
                        warn!(
                            "Answer write to {} failed: {} (session {})",
                            to,
                            cause,
                            if reset { "reset" } else { "kept busy" }
                        );
                        Self::record(state, EightBallError::send_failed(cause), notices);
                    }
                    Ok(_) => {
                        if let Err(cause) = result {
                            debug!("Untracked write {} to {} failed: {}", token, to, cause);
                        }
                    }
                    Err(e) => debug!("Write completion not applied: {}", e),
                }
            }

            TransportEvent::PeerDisconnected { peer } => {
                let answering = state.is_answering();
                if let Ok(SessionOutcome::Cleared(Some(pending))) =
                    state.session.apply(SessionEvent::PeerLost(peer))
                {
                    info!("{} disconnected, dropped {}", peer, pending.exchange);
                    if answering {
                        Self::record(
                            state,
                            EightBallError::send_failed(format!(
                                "{} disconnected before the answer was delivered",
                                peer
                            )),
                            notices,
                        );
                    }
                }
                if state.central.as_ref().is_some_and(|c| c.id == peer) {
                    state.central = None;
                }
            }

            TransportEvent::TransportFailed { cause } => {
                error!("Transport failure: {}", cause);
                Self::record(state, EightBallError::bluetooth(cause), notices);
            }

            TransportEvent::PeerDiscovered { .. }
            | TransportEvent::PeerConnected { .. }
            | TransportEvent::ConnectFailed { .. }
            | TransportEvent::CapabilitiesReady { .. } => {
                debug!("Peripheral role ignores {:?}", event);
            }
        }
    }

    fn accept_question(
        &self,
        state: &mut PeripheralState,
        from: DeviceId,
        exchange: ExchangeId,
        text: String,
        notices: &mut Vec<Notice>,
        commands: &mut Vec<TransportCommand>,
    ) {
        let central = match &state.central {
            Some(central) if central.id == from => central.clone(),
            _ => {
                debug!("Question from unannounced central {}", from);
                let central = CentralDevice::anonymous(from);
                if !state.session.is_busy() {
                    state.central = Some(central.clone());
                }
                central
            }
        };

        let question = PendingQuestion {
            central,
            exchange,
            question: text,
        };
        match state.session.apply(SessionEvent::QuestionArrived(question)) {
            Ok(SessionOutcome::Accepted(pending)) => {
                debug!("Accepted {} from {}", pending.exchange, from);
                notices.push(Notice::Asked {
                    central: pending.central,
                    question: pending.question,
                });
            }
            Ok(SessionOutcome::Reject(reason)) => {
                warn!("Busy, rejecting {} from {}", exchange, from);
                let message = WireMessage::Rejected { exchange, reason };
                match message.encode(self.inner.config.max_text_len) {
                    Ok(payload) => commands.push(TransportCommand::Write {
                        peer: from,
                        capability: self.inner.config.answer_characteristic,
                        payload,
                        token: self.next_token(),
                    }),
                    Err(e) => error!("Failed to encode rejection: {}", e),
                }
            }
            Ok(other) => debug!("Unexpected session outcome {:?}", other),
            Err(e) => debug!("Question not applied: {}", e),
        }
    }

    fn record(state: &mut PeripheralState, error: EightBallError, notices: &mut Vec<Notice>) {
        state.last_error = Some(error.clone());
        notices.push(Notice::Failed(error));
    }

    /// Drive the SDK from a transport event channel until it closes or the SDK shuts down
    pub async fn run(&self, mut events: TransportEventReceiver) {
        let mut shutdown = self.inner.shutdown.subscribe();
        info!("Peripheral {} event loop started", self.inner.origin.instance);
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
                _ = shutdown.changed() => {}
            }
        }
        info!("Peripheral {} event loop stopped", self.inner.origin.instance);
    }

    // ------------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------------

    /// Stop advertising, drop the central, clear the session and all observers
    pub fn shutdown(&self) {
        let mut notices = Vec::new();
        let mut commands = Vec::new();
        {
            let mut state = self.state();
            if state.shut_down {
                return;
            }
            state.shut_down = true;

            if state.is_answering() {
                Self::record(
                    &mut state,
                    EightBallError::send_failed("SDK shut down before the answer was delivered"),
                    &mut notices,
                );
            }
            match state.session.apply(SessionEvent::Reset) {
                Ok(SessionOutcome::Cleared(Some(pending))) => {
                    debug!("Shutdown dropped {}", pending.exchange);
                }
                Ok(_) => {}
                Err(e) => warn!("Session not reset during shutdown: {}", e),
            }
            if state.advertising {
                state.advertising = false;
                commands.push(TransportCommand::StopAdvertising);
            }
            if let Some(central) = state.central.take() {
                commands.push(TransportCommand::Disconnect { peer: central.id });
            }
        }

        self.emit(notices);
        self.inner.observers.clear();
        for command in commands {
            if let Err(e) = self.inner.transport.execute(command) {
                debug!("Ignoring transport error during shutdown: {}", e);
            }
        }
        self.inner.shutdown.send_replace(true);
        info!("Peripheral SDK {} shut down", self.inner.origin.instance);
    }

    // ------------------------------------------------------------------------
    // Delivery
    // ------------------------------------------------------------------------

    fn issue(&self, commands: Vec<TransportCommand>) {
        for command in commands {
            let name = command.name();
            if let Err(e) = self.inner.transport.execute(command) {
                error!("Transport rejected {}: {}", name, e);
                let mut notices = Vec::new();
                Self::record(
                    &mut self.state(),
                    EightBallError::bluetooth(e.to_string()),
                    &mut notices,
                );
                self.emit(notices);
            }
        }
    }

    fn emit(&self, notices: Vec<Notice>) {
        let origin = &self.inner.origin;
        let observers = &self.inner.observers;
        for notice in notices {
            match notice {
                Notice::CentralConnected(central) => {
                    observers.notify_all(|o| o.central_connected(&central, origin));
                }
                Notice::Asked { central, question } => {
                    observers.notify_all(|o| o.question_asked_by_device(&central, &question, origin));
                }
                Notice::AnswerSent {
                    central,
                    answer,
                    question,
                } => {
                    observers
                        .notify_all(|o| o.answer_sent_to_device(&central, &answer, &question, origin));
                }
                Notice::Failed(error) => {
                    observers.notify_all(|o| o.error_occurred(&error, origin));
                }
            }
        }
    }
}
