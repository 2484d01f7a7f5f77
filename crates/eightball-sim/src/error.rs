//! Error types for the simulated air

use eightball_core::{DeviceId, SdkError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("Unknown node: {id}")]
    UnknownNode { id: DeviceId },

    #[error("Router already running")]
    AlreadySpawned,
}

impl SimError {
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        SimError::Configuration {
            reason: reason.into(),
        }
    }
}

impl From<SimError> for SdkError {
    fn from(err: SimError) -> Self {
        SdkError::transport_unavailable(err.to_string())
    }
}

pub type SimResult<T> = core::result::Result<T, SimError>;
