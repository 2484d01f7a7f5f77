//! Simulated 8-Ball world: one Central and several Peripherals on one air

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use eightball_core::{
    answers, CentralSdk, ChannelObserver, DeviceId, EightBallError, ObserverEvent,
    PeripheralDevice, PeripheralSdk,
};
use eightball_sim::SimAir;

use crate::config::AppConfig;
use crate::error::{CliError, Result};

/// How one question ended
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Answered { device: String, answer: String },
    Failed(EightBallError),
}

/// A Peripheral running in the simulated world
pub struct Ball {
    pub id: DeviceId,
    pub name: String,
    pub sdk: PeripheralSdk,
}

/// Central, Peripherals and the air they share
pub struct EightBallApp {
    config: AppConfig,
    _air: SimAir,
    central: CentralSdk,
    notifications: mpsc::Receiver<ObserverEvent>,
    balls: Vec<Ball>,
    tasks: Vec<JoinHandle<()>>,
}

impl EightBallApp {
    /// Build the world and wait until the Central can talk to every Peripheral
    pub async fn start(config: AppConfig) -> Result<Self> {
        let air = SimAir::new(config.sim.clone())?;
        let mut tasks = vec![air.spawn()?];

        let mut balls = Vec::with_capacity(config.demo.peripherals);
        for index in 0..config.demo.peripherals {
            let name = format!("{} {}", config.sdk.local_name, index + 1);
            let (id, link, events) = air.attach_peripheral(name.clone()).into_parts();
            let sdk = PeripheralSdk::new(config.sdk.clone().with_local_name(name.clone()), link)?;

            tasks.push(Self::spawn_responder(&sdk, &config));
            let runner = sdk.clone();
            tasks.push(tokio::spawn(async move { runner.run(events).await }));
            balls.push(Ball { id, name, sdk });
        }

        let (_, link, events) = air.attach_central("Central").into_parts();
        let central = CentralSdk::new(config.sdk.clone(), link)?;
        let (observer, notifications) = ChannelObserver::new(config.sdk.notification_buffer_size);
        central.add_observer(observer);
        let runner = central.clone();
        tasks.push(tokio::spawn(async move { runner.run(events).await }));

        let mut app = Self {
            config,
            _air: air,
            central,
            notifications,
            balls,
            tasks,
        };
        app.wait_until_ready().await?;
        Ok(app)
    }

    /// Each Peripheral answers its questions with a random classic answer
    fn spawn_responder(sdk: &PeripheralSdk, config: &AppConfig) -> JoinHandle<()> {
        let (observer, mut events) = ChannelObserver::new(config.sdk.notification_buffer_size);
        sdk.add_observer(observer);
        let sdk = sdk.clone();
        let delay = config.demo.answer_delay();

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    ObserverEvent::QuestionAskedByDevice { question, .. } => {
                        tokio::time::sleep(delay).await;
                        let answer = answers::random();
                        if let Err(e) = sdk.send_answer(answer, &question) {
                            warn!("Could not answer '{}': {}", question, e);
                        }
                    }
                    ObserverEvent::ErrorOccurred { error, .. } => {
                        debug!("Peripheral reported {}", error);
                    }
                    _ => {}
                }
            }
        })
    }

    async fn wait_until_ready(&mut self) -> Result<()> {
        let expected = self.balls.len();
        let deadline = self.config.demo.startup_timeout();
        let mut discovered = 0;

        let waited = timeout(deadline, async {
            while discovered < expected {
                match self.notifications.recv().await {
                    Some(ObserverEvent::DeviceDiscovered { device, .. }) => {
                        info!("{} is ready", device.name);
                        discovered += 1;
                    }
                    Some(other) => debug!("Ignoring {:?} during startup", other),
                    None => break,
                }
            }
        })
        .await;

        if waited.is_err() || discovered < expected {
            return Err(CliError::Timeout(format!(
                "only {} of {} peripherals became ready",
                discovered, expected
            )));
        }
        Ok(())
    }

    pub fn balls(&self) -> &[Ball] {
        &self.balls
    }

    pub fn devices(&self) -> Vec<PeripheralDevice> {
        self.central.devices()
    }

    /// Ask the Peripheral at `index` and wait for the exchange to end
    pub async fn ask(&mut self, index: usize, question: &str) -> Result<Outcome> {
        let ball = self
            .balls
            .get(index)
            .ok_or(CliError::NoSuchPeripheral(index + 1))?;
        let target = ball.id;
        self.central.send_question(&target, question)?;

        let limit = self.config.sdk.answer_timeout.unwrap_or(Duration::from_secs(30))
            + self.config.demo.answer_delay()
            + Duration::from_secs(1);
        let deadline = Instant::now() + limit;

        loop {
            let event = match tokio::time::timeout_at(deadline, self.notifications.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    return Err(CliError::Timeout("notification channel closed".to_string()))
                }
                Err(_) => {
                    return Err(CliError::Timeout(format!(
                        "no outcome for '{}' after {:?}",
                        question, limit
                    )))
                }
            };
            match event {
                ObserverEvent::QuestionAnsweredByDevice { device, .. } if device.id == target => {
                    return Ok(Outcome::Answered {
                        device: device.name,
                        answer: device.answer.unwrap_or_default(),
                    });
                }
                ObserverEvent::ErrorOccurred { error, .. } => return Ok(Outcome::Failed(error)),
                other => debug!("Ignoring {:?} while waiting", other),
            }
        }
    }

    /// Shut every SDK instance down and stop the background tasks
    pub fn stop(self) {
        self.central.shutdown();
        for ball in &self.balls {
            ball.sdk.shutdown();
        }
        for task in &self.tasks {
            task.abort();
        }
        info!("Simulated world stopped");
    }
}
