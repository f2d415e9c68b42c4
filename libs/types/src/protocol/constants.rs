//! Wire protocol constants

/// The only protocol version this build accepts
pub const PROTOCOL_VERSION: u8 = 1;

/// Fixed header length in 32-bit words
pub const HEADER_WORDS: u8 = 2;

/// Fixed header length in bytes
pub const HEADER_LENGTH: usize = HEADER_WORDS as usize * 4;

/// Largest header length, in words, a received header may declare
pub const MAX_HEADER_WORDS: u8 = 0x0F;
