//! Message Header Implementation

use zerocopy::byteorder::{BigEndian, U16};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::protocol::constants::{HEADER_LENGTH, HEADER_WORDS, PROTOCOL_VERSION};
use crate::protocol::message_type::MessageType;

/// Message Header (8 bytes)
///
/// All fields are single bytes or big-endian `U16`, so the struct has alignment 1
/// and no padding; it can be read straight out of any received buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsBytes, FromBytes, FromZeroes)]
pub struct MessageHeader {
    pub version: u8,
    /// Header length in 32-bit words; zero until the frame is encoded
    pub header_length: u8,
    pub message_type: U16<BigEndian>,
    pub message_type_version: U16<BigEndian>,
    pub reserved: U16<BigEndian>,
}

impl MessageHeader {
    /// Header size in bytes
    pub const SIZE: usize = HEADER_LENGTH;

    /// Header for an outbound message. The length field is left at zero until
    /// the frame is encoded.
    pub fn for_send(message_type: MessageType, type_version: u16) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            header_length: 0,
            message_type: U16::new(message_type.code()),
            message_type_version: U16::new(type_version),
            reserved: U16::ZERO,
        }
    }

    #[inline]
    pub fn type_code(&self) -> u16 {
        self.message_type.get()
    }

    #[inline]
    pub fn type_version(&self) -> u16 {
        self.message_type_version.get()
    }

    /// Declared header length in bytes
    #[inline]
    pub fn header_length_bytes(&self) -> usize {
        self.header_length as usize * 4
    }

    /// Stamp the fixed header length.
    #[inline]
    pub fn seal(&mut self) {
        self.header_length = HEADER_WORDS;
    }

    #[inline]
    pub fn is_sealed(&self) -> bool {
        self.header_length != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size() {
        assert_eq!(std::mem::size_of::<MessageHeader>(), MessageHeader::SIZE);
        assert_eq!(std::mem::align_of::<MessageHeader>(), 1);
        assert_eq!(MessageHeader::SIZE, 8);
    }

    #[test]
    fn test_for_send_defers_length() {
        let mut header = MessageHeader::for_send(MessageType::LockRequest, 3);
        assert_eq!(header.version, PROTOCOL_VERSION);
        assert!(!header.is_sealed());

        header.seal();
        assert_eq!(header.header_length_bytes(), HEADER_LENGTH);
    }

    #[test]
    fn test_big_endian_layout() {
        let mut header = MessageHeader::for_send(MessageType::ClientHandshakeRefused, 0x0102);
        header.seal();
        assert_eq!(header.as_bytes(), &[1, 2, 0, 70, 1, 2, 0, 0]);
    }
}
