//! Characteristic payload format
//!
//! Questions travel Central -> Peripheral on the question characteristic;
//! answers and rejections travel back on the answer characteristic. Each
//! payload is a bincode-encoded [`WireMessage`] tagged with the exchange it
//! belongs to.

use serde::{Deserialize, Serialize};

use crate::errors::{RejectionReason, SdkError, SdkResult};
use crate::types::ExchangeId;

/// Bytes of framing allowed on top of the text fields
pub const WIRE_OVERHEAD: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireMessage {
    Question {
        exchange: ExchangeId,
        text: String,
    },
    Answer {
        exchange: ExchangeId,
        text: String,
        to_question: String,
    },
    Rejected {
        exchange: ExchangeId,
        reason: RejectionReason,
    },
}

/// Check user-supplied question or answer text
pub fn validate_text(text: &str, max_len: usize) -> SdkResult<()> {
    if text.trim().is_empty() {
        return Err(SdkError::EmptyText);
    }
    if text.len() > max_len {
        return Err(SdkError::TextTooLong {
            len: text.len(),
            max: max_len,
        });
    }
    Ok(())
}

/// Largest payload accepted for a given text limit
pub fn max_frame_len(max_text_len: usize) -> usize {
    max_text_len * 2 + WIRE_OVERHEAD
}

impl WireMessage {
    pub fn exchange(&self) -> ExchangeId {
        match self {
            WireMessage::Question { exchange, .. }
            | WireMessage::Answer { exchange, .. }
            | WireMessage::Rejected { exchange, .. } => *exchange,
        }
    }

    /// Serialize to a characteristic payload
    pub fn encode(&self, max_text_len: usize) -> SdkResult<Vec<u8>> {
        self.check_lengths(max_text_len)?;
        let bytes = bincode::serialize(self)?;
        if bytes.len() > max_frame_len(max_text_len) {
            return Err(SdkError::TextTooLong {
                len: bytes.len(),
                max: max_frame_len(max_text_len),
            });
        }
        Ok(bytes)
    }

    /// Deserialize a characteristic payload
    pub fn decode(data: &[u8], max_text_len: usize) -> SdkResult<Self> {
        if data.len() > max_frame_len(max_text_len) {
            return Err(SdkError::invalid_message(format!(
                "payload of {} bytes exceeds {}",
                data.len(),
                max_frame_len(max_text_len)
            )));
        }
        let message: WireMessage = bincode::deserialize(data)?;
        message
            .check_lengths(max_text_len)
            .map_err(|e| SdkError::invalid_message(e.to_string()))?;
        Ok(message)
    }

    fn check_lengths(&self, max_text_len: usize) -> SdkResult<()> {
        match self {
            WireMessage::Question { text, .. } => validate_text(text, max_text_len),
            WireMessage::Answer {
                text, to_question, ..
            } => {
                validate_text(text, max_text_len)?;
                validate_text(to_question, max_text_len)
            }
            WireMessage::Rejected { .. } => Ok(()),
        }
    }
}
