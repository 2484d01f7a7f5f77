//! Error types for the 8-Ball SDK
//!
//! Two families live here. [`EightBallError`] is the taxonomy broadcast to
//! every observer of an SDK instance when an exchange fails; it is never
//! returned from a call. [`SdkError`] is returned directly when a call cannot
//! even be attempted (unknown device, no pending question, SDK shut down).

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::types::DeviceId;

// ----------------------------------------------------------------------------
// Rejections
// ----------------------------------------------------------------------------

/// Why a device declined a question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    /// The device is already working on a question
    DeviceBusy,
    /// Anything else, with an optional diagnostic
    Unknown(Option<String>),
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::DeviceBusy => write!(f, "device busy"),
            RejectionReason::Unknown(Some(detail)) => write!(f, "rejected: {}", detail),
            RejectionReason::Unknown(None) => write!(f, "rejected"),
        }
    }
}

// ----------------------------------------------------------------------------
// Observer-visible Errors
// ----------------------------------------------------------------------------

/// Nested cause carried by an [`EightBallError`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCause {
    /// The remote device declined the exchange
    Rejected(RejectionReason),
    /// Opaque diagnostic from the transport or the SDK
    Diagnostic(String),
}

impl ErrorCause {
    pub fn diagnostic<T: Into<String>>(message: T) -> Self {
        ErrorCause::Diagnostic(message.into())
    }
}

impl fmt::Display for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCause::Rejected(reason) => write!(f, "{}", reason),
            ErrorCause::Diagnostic(message) => write!(f, "{}", message),
        }
    }
}

/// Errors delivered to observers through `error_occurred`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EightBallError {
    #[error("Bluetooth error{}", format_cause(.0))]
    CoreBluetooth(Option<ErrorCause>),

    #[error("Send failed{}", format_cause(.0))]
    SendFailed(Option<ErrorCause>),

    #[error("Unknown error{}", format_cause(.0))]
    Unknown(Option<ErrorCause>),
}

fn format_cause(cause: &Option<ErrorCause>) -> String {
    match cause {
        Some(cause) => format!(": {}", cause),
        None => String::new(),
    }
}

impl EightBallError {
    /// Stable text slug for UI lookup tables
    pub fn code(&self) -> &'static str {
        match self {
            EightBallError::CoreBluetooth(_) => "bluetooth",
            EightBallError::SendFailed(_) => "send-failed",
            EightBallError::Unknown(_) => "unknown",
        }
    }

    /// The nested cause, if any
    pub fn cause(&self) -> Option<&ErrorCause> {
        match self {
            EightBallError::CoreBluetooth(cause)
            | EightBallError::SendFailed(cause)
            | EightBallError::Unknown(cause) => cause.as_ref(),
        }
    }

    /// True when the exchange failed because the remote device was busy
    pub fn is_device_busy(&self) -> bool {
        matches!(
            self.cause(),
            Some(ErrorCause::Rejected(RejectionReason::DeviceBusy))
        )
    }

    pub fn send_failed<T: Into<String>>(message: T) -> Self {
        EightBallError::SendFailed(Some(ErrorCause::diagnostic(message)))
    }

    pub fn rejected(reason: RejectionReason) -> Self {
        EightBallError::SendFailed(Some(ErrorCause::Rejected(reason)))
    }

    pub fn bluetooth<T: Into<String>>(message: T) -> Self {
        EightBallError::CoreBluetooth(Some(ErrorCause::diagnostic(message)))
    }
}

// ----------------------------------------------------------------------------
// Session Errors
// ----------------------------------------------------------------------------

/// Invalid transitions of the per-device session state machine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid session transition: {event} while {state}")]
    InvalidTransition {
        state: &'static str,
        event: &'static str,
    },

    #[error("Answer is for '{given}' but the pending question is '{pending}'")]
    QuestionMismatch { pending: String, given: String },
}

// ----------------------------------------------------------------------------
// Direct Call Errors
// ----------------------------------------------------------------------------

/// Errors returned directly from SDK calls
#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error("Unknown device: {device}")]
    UnknownDevice { device: DeviceId },

    #[error("Device {device} is not ready for questions")]
    DeviceNotReady { device: DeviceId },

    #[error("No question is pending")]
    NoPendingQuestion,

    #[error("Text must not be empty")]
    EmptyText,

    #[error("Text too long: {len} bytes (max: {max})")]
    TextTooLong { len: usize, max: usize },

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Transport unavailable: {reason}")]
    TransportUnavailable { reason: String },

    #[error("Wire encoding error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Invalid wire message: {reason}")]
    InvalidMessage { reason: String },

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("SDK instance has been shut down")]
    ShutDown,
}

impl SdkError {
    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        SdkError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a transport unavailable error with a reason
    pub fn transport_unavailable<T: Into<String>>(reason: T) -> Self {
        SdkError::TransportUnavailable {
            reason: reason.into(),
        }
    }

    /// Create an invalid message error with a reason
    pub fn invalid_message<T: Into<String>>(reason: T) -> Self {
        SdkError::InvalidMessage {
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type SdkResult<T> = core::result::Result<T, SdkError>;
