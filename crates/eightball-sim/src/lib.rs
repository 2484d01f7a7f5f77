//! In-process Bluetooth LE simulator for the 8-Ball SDK
//!
//! [`SimAir`] is a shared radio medium. Each attached node gets a [`SimLink`]
//! (its [`TransportAdapter`](eightball_core::TransportAdapter)) and an event
//! receiver to drive an SDK instance with. The air can drop writes at a
//! configurable rate, repeat advertisements and capability callbacks, and
//! power radios off, which makes it the harness for scenario tests and the
//! CLI demo.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use eightball_core::{Role, Sdk, SdkConfig};
//! use eightball_sim::{SimAir, SimConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let air = SimAir::new(SimConfig::reliable())?;
//! air.spawn()?;
//!
//! let (_, link, events) = air.attach_peripheral("Ball").into_parts();
//! let sdk = Sdk::create_instance(Role::Peripheral, SdkConfig::default(), link)?;
//! tokio::spawn(async move { sdk.run(events).await });
//! # Ok(())
//! # }
//! ```

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod air;
pub mod config;
pub mod error;
pub mod link;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use air::SimAir;
pub use config::SimConfig;
pub use error::{SimError, SimResult};
pub use link::{SimEndpoint, SimLink};
