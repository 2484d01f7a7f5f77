//! Simulated air configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Behaviour of the simulated radio medium
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Probability that any single write fails (0.0 ..= 1.0)
    pub failure_rate: f64,
    /// Seed for the failure coin flip; `None` seeds from entropy
    pub seed: Option<u64>,
    /// Delay applied before each command takes effect
    pub latency: Duration,
    /// Extra copies of every advertisement a scanner sees
    pub duplicate_advertisements: usize,
    /// Extra copies of every capability discovery callback
    pub duplicate_capability_callbacks: usize,
    /// Whether radios report powered on when attached
    pub start_powered_on: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.1,
            seed: None,
            latency: Duration::ZERO,
            duplicate_advertisements: 0,
            duplicate_capability_callbacks: 0,
            start_powered_on: true,
        }
    }
}

impl SimConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A medium that never drops writes, for deterministic scenarios
    pub fn reliable() -> Self {
        Self::default().with_failure_rate(0.0)
    }

    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_duplicate_advertisements(mut self, copies: usize) -> Self {
        self.duplicate_advertisements = copies;
        self
    }

    pub fn with_duplicate_capability_callbacks(mut self, copies: usize) -> Self {
        self.duplicate_capability_callbacks = copies;
        self
    }

    pub fn with_start_powered_on(mut self, powered: bool) -> Self {
        self.start_powered_on = powered;
        self
    }

    pub fn validate(&self) -> SimResult<()> {
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(SimError::config_error(format!(
                "Failure rate must be between 0 and 1, got {}",
                self.failure_rate
            )));
        }
        Ok(())
    }
}
