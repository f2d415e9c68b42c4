//! # Frame Decoder
//!
//! ## Purpose
//!
//! First four steps of inbound message parsing, independent of any channel:
//!
//! 1. decode the header from the prefix of the first segment
//! 2. validate version and header length (a mismatch is fatal, never retried)
//! 3. strip the header bytes: slice the first segment, or drop it when it held
//!    nothing but the header
//! 4. resolve the message type from the header code
//!
//! The result is a [`WireFrame`] whose body segments still hold undecoded bytes.
//! Turning it into a typed message is the message factory's job.

use bytes::{Buf, Bytes};
use types::{MessageHeader, MessageType};

use crate::error::{ProtocolError, ProtocolResult};
use crate::header::{validate, wrap_for_receive};

/// A validated header plus the body segments that follow it
#[derive(Debug, Clone)]
pub struct WireFrame {
    pub header: MessageHeader,
    pub message_type: MessageType,
    pub body: Vec<Bytes>,
}

impl WireFrame {
    pub fn body_len(&self) -> usize {
        self.body.iter().map(Bytes::len).sum()
    }
}

/// Decode one logical message from its receive segments.
pub fn decode_frame(mut segments: Vec<Bytes>) -> ProtocolResult<WireFrame> {
    let first = segments.first().ok_or(ProtocolError::EmptyFrame)?;
    let header = *wrap_for_receive(first)?;
    validate(&header)?;

    let header_len = header.header_length_bytes();
    if segments[0].len() == header_len {
        segments.remove(0);
    } else {
        segments[0].advance(header_len);
    }

    let code = header.type_code();
    let message_type =
        MessageType::from_code(code).ok_or(ProtocolError::UnknownMessageType { code })?;

    Ok(WireFrame {
        header,
        message_type,
        body: segments,
    })
}
