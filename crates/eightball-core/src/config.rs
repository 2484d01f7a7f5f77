//! SDK configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{SdkError, SdkResult};
use crate::protocol::{
    ANSWER_CHARACTERISTIC_UUID, DEFAULT_LOCAL_NAME, EIGHTBALL_SERVICE_UUID, MAX_ATTRIBUTE_LEN,
    QUESTION_CHARACTERISTIC_UUID,
};

// ----------------------------------------------------------------------------
// Disconnect Policy
// ----------------------------------------------------------------------------

/// What a Central does with a registry entry when its peer disconnects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisconnectPolicy {
    /// Keep the device listed, marked as disconnected
    #[default]
    Retain,
    /// Remove the device from the registry
    Prune,
}

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration shared by Central and Peripheral SDK instances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// Service scanned for by Centrals and advertised by Peripherals
    pub service_uuid: Uuid,
    /// Characteristic carrying questions
    pub question_characteristic: Uuid,
    /// Characteristic carrying answers and rejections
    pub answer_characteristic: Uuid,
    /// Local name a Peripheral advertises
    pub local_name: String,
    /// Registry behaviour on peer disconnect
    pub disconnect_policy: DisconnectPolicy,
    /// Return a Peripheral session to Idle when sending its answer fails
    pub reset_session_on_error: bool,
    /// How long a Central waits for an answer before failing the exchange
    pub answer_timeout: Option<Duration>,
    /// Maximum question/answer text length in bytes
    pub max_text_len: usize,
    /// Period of the maintenance tick in `run`
    pub maintenance_interval: Duration,
    /// Buffer size for UI notification channels
    pub notification_buffer_size: usize,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            service_uuid: EIGHTBALL_SERVICE_UUID,
            question_characteristic: QUESTION_CHARACTERISTIC_UUID,
            answer_characteristic: ANSWER_CHARACTERISTIC_UUID,
            local_name: DEFAULT_LOCAL_NAME.to_string(),
            disconnect_policy: DisconnectPolicy::Retain,
            reset_session_on_error: true,
            answer_timeout: Some(Duration::from_secs(30)),
            max_text_len: MAX_ATTRIBUTE_LEN,
            maintenance_interval: Duration::from_secs(1),
            notification_buffer_size: 64,
        }
    }
}

impl SdkConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the advertised local name
    pub fn with_local_name<T: Into<String>>(mut self, name: T) -> Self {
        self.local_name = name.into();
        self
    }

    /// Set the disconnect policy
    pub fn with_disconnect_policy(mut self, policy: DisconnectPolicy) -> Self {
        self.disconnect_policy = policy;
        self
    }

    /// Enable or disable automatic session reset after a failed answer
    pub fn with_reset_session_on_error(mut self, enabled: bool) -> Self {
        self.reset_session_on_error = enabled;
        self
    }

    /// Set the answer timeout (`None` waits forever)
    pub fn with_answer_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.answer_timeout = timeout;
        self
    }

    /// Set the maximum text length
    pub fn with_max_text_len(mut self, len: usize) -> Self {
        self.max_text_len = len;
        self
    }

    /// Set the maintenance tick period
    pub fn with_maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    /// The characteristics a Peripheral must expose before it is usable
    pub fn required_characteristics(&self) -> [Uuid; 2] {
        [self.question_characteristic, self.answer_characteristic]
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> SdkResult<()> {
        if self.question_characteristic == self.answer_characteristic {
            return Err(SdkError::config_error(
                "Question and answer characteristics must differ",
            ));
        }
        if self.max_text_len == 0 {
            return Err(SdkError::config_error(
                "Maximum text length must be greater than 0",
            ));
        }
        if self.maintenance_interval.is_zero() {
            return Err(SdkError::config_error(
                "Maintenance interval must be greater than 0",
            ));
        }
        if self.notification_buffer_size == 0 {
            return Err(SdkError::config_error(
                "Notification buffer size must be greater than 0",
            ));
        }
        if matches!(self.answer_timeout, Some(timeout) if timeout.is_zero()) {
            return Err(SdkError::config_error("Answer timeout must be greater than 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SdkConfig::default().validate().is_ok());
    }

    #[test]
    fn test_identical_characteristics_rejected() {
        let mut config = SdkConfig::default();
        config.answer_characteristic = config.question_characteristic;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = SdkConfig::default().with_answer_timeout(Some(Duration::ZERO));
        assert!(config.validate().is_err());
        let config = SdkConfig::default().with_answer_timeout(None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_sets_fields() {
        let config = SdkConfig::new()
            .with_local_name("Desk Ball")
            .with_disconnect_policy(DisconnectPolicy::Prune)
            .with_reset_session_on_error(false)
            .with_max_text_len(64);
        assert_eq!(config.local_name, "Desk Ball");
        assert_eq!(config.disconnect_policy, DisconnectPolicy::Prune);
        assert!(!config.reset_session_on_error);
        assert_eq!(config.max_text_len, 64);
    }
}
