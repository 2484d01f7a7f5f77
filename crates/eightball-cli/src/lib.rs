//! Magic 8-Ball CLI library
//!
//! Runs a Central and several Peripherals on the simulated air so the SDK
//! can be exercised end to end from a terminal.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use app::{EightBallApp, Outcome};
pub use cli::{Cli, Commands};
pub use config::{AppConfig, Overrides};
pub use error::{CliError, Result};
