//! Error handling for the 8-Ball CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("SDK error: {0}")]
    Sdk(#[from] eightball_core::SdkError),

    #[error("Simulator error: {0}")]
    Sim(#[from] eightball_sim::SimError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("No such peripheral: {0}")]
    NoSuchPeripheral(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),
}

impl CliError {
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        CliError::Config(reason.into())
    }
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        CliError::Config(err.to_string())
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
