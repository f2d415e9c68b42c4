//! Error types for message type table validation

use thiserror::Error;

/// Failures of the startup self-check over the message type table.
///
/// Any of these is a programming error in the table itself, so callers abort
/// initialization instead of handling them per message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Two records share a wire code
    #[error("Duplicate message type code {code}: {first} and {second}")]
    DuplicateCode {
        code: u16,
        first: &'static str,
        second: &'static str,
    },

    /// Two records share a symbolic name
    #[error("Duplicate message type name {name}")]
    DuplicateName { name: &'static str },

    /// Codes must be listed in ascending order
    #[error("Message type {name} (code {code}) is out of order after code {previous}")]
    OutOfOrder {
        name: &'static str,
        code: u16,
        previous: u16,
    },

    /// Code zero is never a valid wire code
    #[error("Message type {name} uses reserved code 0")]
    ReservedCode { name: &'static str },

    /// Name does not follow the UPPER_SNAKE_CASE `_MESSAGE` convention
    #[error("Message type name {name} violates naming convention: {reason}")]
    InvalidName {
        name: &'static str,
        reason: &'static str,
    },

    /// A record whose code does not resolve back to a variant with the same name
    #[error("Message type record {name} (code {code}) has no matching variant")]
    Unresolved { name: &'static str, code: u16 },
}

impl RegistryError {
    pub fn invalid_name(name: &'static str, reason: &'static str) -> Self {
        Self::InvalidName { name, reason }
    }
}
