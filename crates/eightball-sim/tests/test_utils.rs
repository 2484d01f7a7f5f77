//! Test utilities for running SDK instances on the simulated air
//!
//! A [`Fixture`] wires one Central and any number of Peripherals to a
//! [`SimAir`], spawns their event loops and waits until every Peripheral is
//! ready for questions. [`Recorder`] captures every observer callback so
//! scenarios can assert on exact notification counts.

#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use eightball_core::{
    answers, CentralDevice, CentralObserver, CentralSdk, ChannelObserver, DeviceId,
    EightBallError, Observer, ObserverEvent, PeripheralDevice, PeripheralObserver,
    PeripheralSdk, SdkConfig, SdkOrigin,
};
use eightball_sim::{SimAir, SimConfig};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(5);

// ----------------------------------------------------------------------------
// Waiting
// ----------------------------------------------------------------------------

/// Poll `condition` until it holds or [`WAIT_TIMEOUT`] elapses
pub async fn wait_until<F: FnMut() -> bool>(mut condition: F) -> bool {
    timeout(WAIT_TIMEOUT, async {
        while !condition() {
            sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .is_ok()
}

/// Run `future` with the standard test timeout
pub async fn within<F: Future>(future: F) -> F::Output {
    match timeout(WAIT_TIMEOUT, future).await {
        Ok(output) => output,
        Err(_) => panic!("timed out after {:?}", WAIT_TIMEOUT),
    }
}

/// Let queued events settle
pub async fn settle() {
    sleep(Duration::from_millis(50)).await;
}

// ----------------------------------------------------------------------------
// Recording Observer
// ----------------------------------------------------------------------------

/// Observer for either role that keeps every callback it receives
#[derive(Debug, Default)]
pub struct Recorder {
    events: Mutex<Vec<ObserverEvent>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, event: ObserverEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub fn events(&self) -> Vec<ObserverEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count<F: Fn(&ObserverEvent) -> bool>(&self, predicate: F) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|event| predicate(event))
            .count()
    }

    pub fn errors(&self) -> Vec<EightBallError> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ObserverEvent::ErrorOccurred { error, .. } => Some(error),
                _ => None,
            })
            .collect()
    }

    pub fn error_count(&self) -> usize {
        self.count(|e| matches!(e, ObserverEvent::ErrorOccurred { .. }))
    }

    pub fn discovered_count(&self) -> usize {
        self.count(|e| matches!(e, ObserverEvent::DeviceDiscovered { .. }))
    }

    pub fn disconnected_count(&self) -> usize {
        self.count(|e| matches!(e, ObserverEvent::DeviceDisconnected { .. }))
    }

    pub fn asked_of_count(&self) -> usize {
        self.count(|e| matches!(e, ObserverEvent::QuestionAskedOfDevice { .. }))
    }

    pub fn answered_count(&self) -> usize {
        self.count(|e| matches!(e, ObserverEvent::QuestionAnsweredByDevice { .. }))
    }

    pub fn asked_by_count(&self) -> usize {
        self.count(|e| matches!(e, ObserverEvent::QuestionAskedByDevice { .. }))
    }

    pub fn answer_sent_count(&self) -> usize {
        self.count(|e| matches!(e, ObserverEvent::AnswerSentToDevice { .. }))
    }
}

impl Observer for Recorder {
    fn error_occurred(&self, error: &EightBallError, sdk: &SdkOrigin) {
        self.push(ObserverEvent::ErrorOccurred {
            error: error.clone(),
            sdk: *sdk,
        });
    }
}

impl CentralObserver for Recorder {
    fn device_discovered(&self, device: &PeripheralDevice, sdk: &SdkOrigin) {
        self.push(ObserverEvent::DeviceDiscovered {
            device: device.clone(),
            sdk: *sdk,
        });
    }

    fn device_disconnected(&self, device: &PeripheralDevice, sdk: &SdkOrigin) {
        self.push(ObserverEvent::DeviceDisconnected {
            device: device.clone(),
            sdk: *sdk,
        });
    }

    fn question_asked_of_device(&self, device: &PeripheralDevice, sdk: &SdkOrigin) {
        self.push(ObserverEvent::QuestionAskedOfDevice {
            device: device.clone(),
            sdk: *sdk,
        });
    }

    fn question_answered_by_device(&self, device: &PeripheralDevice, sdk: &SdkOrigin) {
        self.push(ObserverEvent::QuestionAnsweredByDevice {
            device: device.clone(),
            sdk: *sdk,
        });
    }
}

impl PeripheralObserver for Recorder {
    fn central_connected(&self, central: &CentralDevice, sdk: &SdkOrigin) {
        self.push(ObserverEvent::CentralConnected {
            central: central.clone(),
            sdk: *sdk,
        });
    }

    fn question_asked_by_device(&self, central: &CentralDevice, question: &str, sdk: &SdkOrigin) {
        self.push(ObserverEvent::QuestionAskedByDevice {
            central: central.clone(),
            question: question.to_string(),
            sdk: *sdk,
        });
    }

    fn answer_sent_to_device(
        &self,
        central: &CentralDevice,
        answer: &str,
        question: &str,
        sdk: &SdkOrigin,
    ) {
        self.push(ObserverEvent::AnswerSentToDevice {
            central: central.clone(),
            answer: answer.to_string(),
            question: question.to_string(),
            sdk: *sdk,
        });
    }
}

// ----------------------------------------------------------------------------
// Auto Responder
// ----------------------------------------------------------------------------

/// Answer every question `peripheral` receives with a classic answer
pub fn spawn_responder(peripheral: &PeripheralSdk) -> JoinHandle<()> {
    let (observer, mut events) = ChannelObserver::new(64);
    peripheral.add_observer(observer);
    let sdk = peripheral.clone();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let ObserverEvent::QuestionAskedByDevice { question, .. } = event {
                let _ = sdk.send_answer(answers::random(), &question);
            }
        }
    })
}

// ----------------------------------------------------------------------------
// Fixture
// ----------------------------------------------------------------------------

/// A Peripheral running on the air
pub struct PeripheralNode {
    pub id: DeviceId,
    pub sdk: PeripheralSdk,
    pub log: Arc<Recorder>,
}

/// One Central and several Peripherals sharing a simulated air
pub struct Fixture {
    pub air: SimAir,
    pub central_id: DeviceId,
    pub central: CentralSdk,
    pub central_log: Arc<Recorder>,
    pub peripherals: Vec<PeripheralNode>,
    tasks: Vec<JoinHandle<()>>,
}

impl Fixture {
    pub fn builder() -> FixtureBuilder {
        FixtureBuilder::default()
    }

    pub fn peripheral(&self, index: usize) -> &PeripheralNode {
        &self.peripherals[index]
    }

    /// Whether the Central sees every Peripheral as ready
    pub fn all_ready(&self) -> bool {
        let devices = self.central.devices();
        devices.len() == self.peripherals.len() && devices.iter().all(|d| d.is_ready())
    }

    pub fn keep(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

pub struct FixtureBuilder {
    peripherals: usize,
    sim: SimConfig,
    central_config: SdkConfig,
    peripheral_config: SdkConfig,
}

impl Default for FixtureBuilder {
    fn default() -> Self {
        Self {
            peripherals: 1,
            sim: SimConfig::reliable(),
            central_config: SdkConfig::default(),
            peripheral_config: SdkConfig::default(),
        }
    }
}

impl FixtureBuilder {
    pub fn peripherals(mut self, count: usize) -> Self {
        self.peripherals = count;
        self
    }

    pub fn sim(mut self, config: SimConfig) -> Self {
        self.sim = config;
        self
    }

    pub fn central_config(mut self, config: SdkConfig) -> Self {
        self.central_config = config;
        self
    }

    pub fn peripheral_config(mut self, config: SdkConfig) -> Self {
        self.peripheral_config = config;
        self
    }

    /// Start everything and wait until the Central sees every Peripheral ready
    pub async fn build(self) -> Fixture {
        let air = SimAir::new(self.sim).unwrap();
        let mut tasks = vec![air.spawn().unwrap()];

        let mut peripherals = Vec::with_capacity(self.peripherals);
        for index in 0..self.peripherals {
            let name = format!("Ball {}", index + 1);
            let (id, link, events) = air.attach_peripheral(name.clone()).into_parts();
            let config = self.peripheral_config.clone().with_local_name(name);
            let sdk = PeripheralSdk::new(config, link).unwrap();
            let log = Recorder::new();
            sdk.add_observer(log.clone()).unwrap();

            let runner = sdk.clone();
            tasks.push(tokio::spawn(async move { runner.run(events).await }));
            peripherals.push(PeripheralNode { id, sdk, log });
        }

        let (central_id, link, events) = air.attach_central("Central").into_parts();
        let central = CentralSdk::new(self.central_config, link).unwrap();
        let central_log = Recorder::new();
        central.add_observer(central_log.clone()).unwrap();
        let runner = central.clone();
        tasks.push(tokio::spawn(async move { runner.run(events).await }));

        let fixture = Fixture {
            air,
            central_id,
            central,
            central_log,
            peripherals,
            tasks,
        };
        assert!(
            wait_until(|| fixture.all_ready()).await,
            "peripherals never became ready"
        );
        fixture
    }
}
