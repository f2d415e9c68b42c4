//! # Wire Header Codec
//!
//! Builds, views, validates and frames the fixed 8-byte message header.
//!
//! - [`build_for_send`]: header for an outbound message, length deferred
//! - [`wrap_for_receive`]: zero-copy view over the prefix of a received buffer
//! - [`validate`]: version and header-length checks
//! - [`encode_frame`]: seals the header length and appends the body

use std::mem::size_of;

use bytes::{BufMut, Bytes, BytesMut};
use types::{MessageHeader, MessageType, HEADER_LENGTH, HEADER_WORDS, MAX_HEADER_WORDS, PROTOCOL_VERSION};
use zerocopy::{AsBytes, Ref};

use crate::error::{ProtocolError, ProtocolResult};

/// Header for a message about to be built; the length is stamped by
/// [`encode_frame`] once the body is complete.
pub fn build_for_send(message_type: MessageType, type_version: u16) -> MessageHeader {
    MessageHeader::for_send(message_type, type_version)
}

/// View the header at the start of `data` without copying.
///
/// Fails when the buffer is shorter than a header or the declared header length
/// is beyond the protocol maximum. Version and exact length are checked by
/// [`validate`].
pub fn wrap_for_receive(data: &[u8]) -> ProtocolResult<&MessageHeader> {
    if data.len() < size_of::<MessageHeader>() {
        return Err(ProtocolError::message_too_small(
            size_of::<MessageHeader>(),
            data.len(),
            "message header",
        ));
    }

    let header = Ref::<_, MessageHeader>::new(&data[..size_of::<MessageHeader>()])
        .ok_or_else(|| {
            ProtocolError::message_too_small(
                size_of::<MessageHeader>(),
                data.len(),
                "message header zerocopy conversion",
            )
        })?
        .into_ref();

    if header.header_length > MAX_HEADER_WORDS {
        return Err(ProtocolError::HeaderLengthOutOfBounds {
            declared_words: header.header_length,
            max_words: MAX_HEADER_WORDS,
        });
    }

    Ok(header)
}

/// Check protocol version and that the declared length equals the fixed length.
pub fn validate(header: &MessageHeader) -> ProtocolResult<()> {
    if header.version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion {
            version: header.version,
            supported: PROTOCOL_VERSION,
        });
    }

    if header.header_length != HEADER_WORDS {
        return Err(ProtocolError::InvalidHeaderLength {
            declared_words: header.header_length,
            expected_words: HEADER_WORDS,
        });
    }

    Ok(())
}

/// Seal the header and write header + body into one contiguous frame.
pub fn encode_frame(mut header: MessageHeader, body: &[u8]) -> Bytes {
    header.seal();

    let mut frame = BytesMut::with_capacity(HEADER_LENGTH + body.len());
    frame.put_slice(header.as_bytes());
    frame.put_slice(body);
    frame.freeze()
}
