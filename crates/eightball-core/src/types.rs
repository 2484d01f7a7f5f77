//! Core identifier types for the 8-Ball SDK
//!
//! Identifiers are newtypes so that a device id can never be handed to an API
//! expecting an observer token or a write correlation token.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::SdkError;

// ----------------------------------------------------------------------------
// Device Identifier
// ----------------------------------------------------------------------------

/// Stable identifier of a remote peer, sourced from the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(Uuid);

impl DeviceId {
    /// Wrap a transport-provided UUID
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a fresh random identifier
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeviceId {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| SdkError::config_error(format!("Invalid device id '{}': {}", s, e)))
    }
}

// ----------------------------------------------------------------------------
// Instance and Observer Identifiers
// ----------------------------------------------------------------------------

/// Identifier of one SDK instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(Uuid);

impl InstanceId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle returned when an observer is registered
///
/// The bus assigns it; observers never mint or mutate their own identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(Uuid);

impl ObserverToken {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ObserverToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Correlation Identifiers
// ----------------------------------------------------------------------------

/// Correlates a write command with its completion event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WriteToken(u64);

impl WriteToken {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WriteToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// Identifies one question/answer exchange on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExchangeId(u64);

impl ExchangeId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Roles and Raw Peers
// ----------------------------------------------------------------------------

/// The two Bluetooth LE roles an SDK instance can play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Discovers peers and asks questions
    Central,
    /// Advertises and answers questions
    Peripheral,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Central => write!(f, "Central"),
            Role::Peripheral => write!(f, "Peripheral"),
        }
    }
}

/// Which SDK instance raised a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdkOrigin {
    pub instance: InstanceId,
    pub role: Role,
}

/// A peer as reported by the transport, before the SDK wraps it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPeer {
    pub id: DeviceId,
    pub name: Option<String>,
}

impl RawPeer {
    pub fn new(id: DeviceId, name: Option<String>) -> Self {
        Self { id, name }
    }

    /// The advertised name, if it is present and not blank
    pub fn usable_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_round_trips_through_display() {
        let id = DeviceId::random();
        let parsed: DeviceId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_invalid_device_id_is_rejected() {
        assert!("not-a-uuid".parse::<DeviceId>().is_err());
    }

    #[test]
    fn test_exchange_ids_order_by_value() {
        let mut ids = vec![ExchangeId::new(3), ExchangeId::new(1), ExchangeId::new(2)];
        ids.sort();
        assert_eq!(ids, vec![ExchangeId::new(1), ExchangeId::new(2), ExchangeId::new(3)]);
        assert!(ExchangeId::new(9) > ExchangeId::new(4));
    }

    #[test]
    fn test_usable_name_filters_blank_names() {
        let id = DeviceId::random();
        assert_eq!(RawPeer::new(id, None).usable_name(), None);
        assert_eq!(RawPeer::new(id, Some(String::new())).usable_name(), None);
        assert_eq!(RawPeer::new(id, Some("   ".into())).usable_name(), None);
        assert_eq!(
            RawPeer::new(id, Some(" 8-Ball ".into())).usable_name(),
            Some("8-Ball")
        );
    }
}
