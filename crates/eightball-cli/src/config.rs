//! 8-Ball CLI configuration management
//!
//! Configuration is layered with figment, later layers winning:
//! - Default values
//! - Configuration file (`eightball.toml`, or the file given with `--config`)
//! - Environment variables (`EIGHTBALL_*`, nested keys split on `__`)
//! - Command line arguments

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use eightball_core::SdkConfig;
use eightball_sim::SimConfig;

use crate::error::{CliError, Result};

/// File read when no `--config` path is given
pub const DEFAULT_CONFIG_FILE: &str = "eightball.toml";

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the 8-Ball CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Settings shared by every SDK instance in the demo
    pub sdk: SdkConfig,
    /// Behaviour of the simulated air
    pub sim: SimConfig,
    /// Demo run parameters
    pub demo: DemoConfig,
}

/// Parameters of a demo run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Number of simulated peripherals
    pub peripherals: usize,
    /// Number of questions the Central asks
    pub questions: usize,
    /// How long a peripheral "thinks" before answering (in milliseconds)
    pub answer_delay_ms: u64,
    /// How long to wait for peripherals to become ready (in seconds)
    pub startup_timeout_secs: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            peripherals: 3,
            questions: 5,
            answer_delay_ms: 250,
            startup_timeout_secs: 10,
        }
    }
}

impl DemoConfig {
    pub fn answer_delay(&self) -> Duration {
        Duration::from_millis(self.answer_delay_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }
}

/// Values given on the command line, applied last
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub peripherals: Option<usize>,
    pub questions: Option<usize>,
    pub failure_rate: Option<f64>,
    pub seed: Option<u64>,
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load defaults, the config file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_overrides(path, &Overrides::default())
    }

    /// Load every layer, then apply command line overrides
    pub fn load_with_overrides(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(Self::config_path(path)))
            .merge(Env::prefixed("EIGHTBALL_").split("__"));

        if let Some(peripherals) = overrides.peripherals {
            figment = figment.merge(("demo.peripherals", peripherals));
        }
        if let Some(questions) = overrides.questions {
            figment = figment.merge(("demo.questions", questions));
        }
        if let Some(rate) = overrides.failure_rate {
            figment = figment.merge(("sim.failure_rate", rate));
        }
        if let Some(seed) = overrides.seed {
            figment = figment.merge(("sim.seed", seed));
        }

        let config: AppConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// The file a configuration is read from and saved to
    pub fn config_path(path: Option<&Path>) -> PathBuf {
        path.map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Save configuration to a specific file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path.as_ref(), self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<()> {
        self.sdk.validate()?;
        self.sim.validate()?;

        if self.demo.peripherals == 0 {
            return Err(CliError::config_error(
                "At least one peripheral must be simulated",
            ));
        }
        if self.demo.startup_timeout_secs == 0 {
            return Err(CliError::config_error(
                "Startup timeout must be greater than 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.demo.peripherals, 3);
        assert_eq!(config.sim.failure_rate, 0.1);
    }

    #[test]
    fn test_layers_apply_in_order() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
                [demo]
                peripherals = 4
                questions = 2

                [sdk]
                local_name = "Desk Ball"
                "#,
            )?;
            jail.set_env("EIGHTBALL_DEMO__QUESTIONS", "7");

            let config = AppConfig::load(None).map_err(|e| e.to_string())?;
            assert_eq!(config.demo.peripherals, 4);
            assert_eq!(config.demo.questions, 7);
            assert_eq!(config.sdk.local_name, "Desk Ball");

            let overrides = Overrides {
                peripherals: Some(6),
                seed: Some(11),
                ..Overrides::default()
            };
            let config = AppConfig::load_with_overrides(None, &overrides).map_err(|e| e.to_string())?;
            assert_eq!(config.demo.peripherals, 6);
            assert_eq!(config.demo.questions, 7);
            assert_eq!(config.sim.seed, Some(11));
            Ok(())
        });
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        Jail::expect_with(|_jail| {
            let overrides = Overrides {
                failure_rate: Some(2.0),
                ..Overrides::default()
            };
            assert!(AppConfig::load_with_overrides(None, &overrides).is_err());

            let overrides = Overrides {
                peripherals: Some(0),
                ..Overrides::default()
            };
            assert!(AppConfig::load_with_overrides(None, &overrides).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_saved_file_loads_back() {
        Jail::expect_with(|jail| {
            let path = jail.directory().join("saved").join("eightball.toml");
            let mut config = AppConfig::default();
            config.demo.questions = 12;
            config.sim.seed = Some(3);
            config.save_to_file(&path).map_err(|e| e.to_string())?;

            let loaded = AppConfig::load(Some(&path)).map_err(|e| e.to_string())?;
            assert_eq!(loaded, config);
            Ok(())
        });
    }
}
