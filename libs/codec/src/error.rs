//! Protocol-level errors for wire header and body processing
//!
//! Every variant here is fatal to the connection that produced the bytes: the
//! channel is closed and a fresh connection (with a new session) is expected.

use thiserror::Error;

/// Framing and decoding errors with diagnostic context
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer is too small to contain the expected structure
    #[error("Message too small: need {need} bytes, got {got} (context: {context})")]
    MessageTooSmall {
        need: usize,
        got: usize,
        context: String,
    },

    /// Header version byte is not the supported protocol version
    #[error("Unsupported protocol version {version}: only version {supported} is accepted")]
    UnsupportedVersion { version: u8, supported: u8 },

    /// Declared header length differs from the fixed header length
    #[error("Invalid header length: declared {declared_words} words, expected {expected_words}")]
    InvalidHeaderLength {
        declared_words: u8,
        expected_words: u8,
    },

    /// Declared header length exceeds the protocol maximum
    #[error("Header length {declared_words} words exceeds maximum {max_words}")]
    HeaderLengthOutOfBounds { declared_words: u8, max_words: u8 },

    /// Header carries a type code absent from the message type table
    #[error("Unknown message type code {code}")]
    UnknownMessageType { code: u16 },

    /// Body reader ran out of bytes
    #[error("Body underflow: need {need} bytes, {remaining} remaining (reading {context})")]
    BodyUnderflow {
        need: usize,
        remaining: usize,
        context: &'static str,
    },

    /// Body bytes are present but not a valid encoding of the message
    #[error("Invalid payload for {message_type}: {reason}")]
    InvalidPayload {
        message_type: String,
        reason: String,
    },

    /// No buffer segments were supplied
    #[error("Empty frame: no buffer segments received")]
    EmptyFrame,
}

impl ProtocolError {
    pub fn message_too_small(need: usize, got: usize, context: impl Into<String>) -> Self {
        Self::MessageTooSmall {
            need,
            got,
            context: context.into(),
        }
    }

    pub fn body_underflow(need: usize, remaining: usize, context: &'static str) -> Self {
        Self::BodyUnderflow {
            need,
            remaining,
            context,
        }
    }

    pub fn invalid_payload(message_type: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message_type: message_type.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the header itself was malformed, as opposed to the body
    pub fn is_framing_error(&self) -> bool {
        matches!(
            self,
            Self::MessageTooSmall { .. }
                | Self::UnsupportedVersion { .. }
                | Self::InvalidHeaderLength { .. }
                | Self::HeaderLengthOutOfBounds { .. }
                | Self::UnknownMessageType { .. }
                | Self::EmptyFrame
        )
    }
}

pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_formatting() {
        let err = ProtocolError::message_too_small(8, 3, "header");
        assert_eq!(
            err.to_string(),
            "Message too small: need 8 bytes, got 3 (context: header)"
        );

        let err = ProtocolError::InvalidHeaderLength {
            declared_words: 3,
            expected_words: 2,
        };
        assert!(err.to_string().contains("declared 3 words"));
    }

    #[test]
    fn test_framing_classification() {
        assert!(ProtocolError::UnknownMessageType { code: 99 }.is_framing_error());
        assert!(!ProtocolError::body_underflow(4, 1, "u32").is_framing_error());
    }
}
