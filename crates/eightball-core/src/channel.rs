//! Redispatch of observer callbacks onto a channel
//!
//! Callbacks run on whatever thread delivered the transport event. UI code
//! registers a [`ChannelObserver`] instead and consumes owned
//! [`ObserverEvent`]s from its own task.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use crate::device::{CentralDevice, PeripheralDevice};
use crate::errors::EightBallError;
use crate::observer::{CentralObserver, Observer, PeripheralObserver};
use crate::types::SdkOrigin;

/// Owned copy of an observer callback
#[derive(Debug, Clone, PartialEq)]
pub enum ObserverEvent {
    ErrorOccurred {
        error: EightBallError,
        sdk: SdkOrigin,
    },
    DeviceDiscovered {
        device: PeripheralDevice,
        sdk: SdkOrigin,
    },
    DeviceDisconnected {
        device: PeripheralDevice,
        sdk: SdkOrigin,
    },
    QuestionAskedOfDevice {
        device: PeripheralDevice,
        sdk: SdkOrigin,
    },
    QuestionAnsweredByDevice {
        device: PeripheralDevice,
        sdk: SdkOrigin,
    },
    CentralConnected {
        central: CentralDevice,
        sdk: SdkOrigin,
    },
    QuestionAskedByDevice {
        central: CentralDevice,
        question: String,
        sdk: SdkOrigin,
    },
    AnswerSentToDevice {
        central: CentralDevice,
        answer: String,
        question: String,
        sdk: SdkOrigin,
    },
}

impl ObserverEvent {
    pub fn origin(&self) -> &SdkOrigin {
        match self {
            ObserverEvent::ErrorOccurred { sdk, .. }
            | ObserverEvent::DeviceDiscovered { sdk, .. }
            | ObserverEvent::DeviceDisconnected { sdk, .. }
            | ObserverEvent::QuestionAskedOfDevice { sdk, .. }
            | ObserverEvent::QuestionAnsweredByDevice { sdk, .. }
            | ObserverEvent::CentralConnected { sdk, .. }
            | ObserverEvent::QuestionAskedByDevice { sdk, .. }
            | ObserverEvent::AnswerSentToDevice { sdk, .. } => sdk,
        }
    }
}

/// Observer for either role that forwards every callback into a bounded channel
///
/// When the consumer falls behind, events are dropped with a warning rather
/// than blocking the notifying thread.
#[derive(Debug)]
pub struct ChannelObserver {
    sender: mpsc::Sender<ObserverEvent>,
}

impl ChannelObserver {
    pub fn new(buffer: usize) -> (Arc<Self>, mpsc::Receiver<ObserverEvent>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Arc::new(Self { sender }), receiver)
    }

    fn forward(&self, event: ObserverEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!("Observer channel full, dropping {:?}", event);
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

impl Observer for ChannelObserver {
    fn error_occurred(&self, error: &EightBallError, sdk: &SdkOrigin) {
        self.forward(ObserverEvent::ErrorOccurred {
            error: error.clone(),
            sdk: *sdk,
        });
    }
}

impl CentralObserver for ChannelObserver {
    fn device_discovered(&self, device: &PeripheralDevice, sdk: &SdkOrigin) {
        self.forward(ObserverEvent::DeviceDiscovered {
            device: device.clone(),
            sdk: *sdk,
        });
    }

    fn device_disconnected(&self, device: &PeripheralDevice, sdk: &SdkOrigin) {
        self.forward(ObserverEvent::DeviceDisconnected {
            device: device.clone(),
            sdk: *sdk,
        });
    }

    fn question_asked_of_device(&self, device: &PeripheralDevice, sdk: &SdkOrigin) {
        self.forward(ObserverEvent::QuestionAskedOfDevice {
            device: device.clone(),
            sdk: *sdk,
        });
    }

    fn question_answered_by_device(&self, device: &PeripheralDevice, sdk: &SdkOrigin) {
        self.forward(ObserverEvent::QuestionAnsweredByDevice {
            device: device.clone(),
            sdk: *sdk,
        });
    }
}

impl PeripheralObserver for ChannelObserver {
    fn central_connected(&self, central: &CentralDevice, sdk: &SdkOrigin) {
        self.forward(ObserverEvent::CentralConnected {
            central: central.clone(),
            sdk: *sdk,
        });
    }

    fn question_asked_by_device(&self, central: &CentralDevice, question: &str, sdk: &SdkOrigin) {
        self.forward(ObserverEvent::QuestionAskedByDevice {
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
        self.forward(ObserverEvent::AnswerSentToDevice {
            central: central.clone(),
            answer: answer.to_string(),
            question: question.to_string(),
            sdk: *sdk,
        });
    }
}
