//! BLE protocol constants for the 8-Ball service

use uuid::Uuid;

// ----------------------------------------------------------------------------
// BLE Service and Characteristic UUIDs
// ----------------------------------------------------------------------------

/// 8-Ball BLE service UUID
pub const EIGHTBALL_SERVICE_UUID: Uuid = Uuid::from_u128(0x8E7F1A23_4B2C_11EA_B77F_2E728CE88125);

/// Characteristic a Central writes questions to
pub const QUESTION_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x8E7F1A24_4B2C_11EA_B77F_2E728CE88125);

/// Characteristic a Peripheral writes answers and rejections to
pub const ANSWER_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x8E7F1A25_4B2C_11EA_B77F_2E728CE88125);

/// Local name advertised by Peripherals unless configured otherwise
pub const DEFAULT_LOCAL_NAME: &str = "Magic 8-Ball";

/// Largest attribute value a BLE characteristic can hold
pub const MAX_ATTRIBUTE_LEN: usize = 512;
