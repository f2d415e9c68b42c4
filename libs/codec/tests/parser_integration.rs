//! Integration tests for frame decoding
//!
//! These tests drive raw receive segments through the decoder the way a
//! transport delivers them.

use bytes::Bytes;
use codec::{build_for_send, decode_frame, encode_frame, BodyBuilder, BodyReader, ProtocolError};
use types::{MessageType, HEADER_LENGTH};

#[test]
fn test_complete_frame_decode_workflow() {
    let mut body = BodyBuilder::new();
    body.put_u64(42).put_str("root-a");
    let frame = encode_frame(build_for_send(MessageType::RequestRoot, 2), body.as_slice());

    let decoded = decode_frame(vec![frame]).expect("valid frame");
    assert_eq!(decoded.message_type, MessageType::RequestRoot);
    assert_eq!(decoded.header.type_version(), 2);

    let mut reader = BodyReader::new(decoded.body);
    assert_eq!(reader.get_u64().unwrap(), 42);
    assert_eq!(reader.get_string().unwrap(), "root-a");
    assert!(reader.is_empty());
}

#[test]
fn test_header_split_from_body_segments() {
    let frame = encode_frame(build_for_send(MessageType::LockRecall, 0), &[]);
    assert_eq!(frame.len(), HEADER_LENGTH);

    let decoded = decode_frame(vec![
        frame,
        Bytes::from_static(b"one"),
        Bytes::from_static(b"two"),
    ])
    .unwrap();
    assert_eq!(decoded.body.len(), 2);
    assert_eq!(decoded.body_len(), 6);
}

#[test]
fn test_unknown_type_code_is_fatal() {
    let mut frame = encode_frame(build_for_send(MessageType::Ping, 0), b"x").to_vec();
    frame[2] = 0x7F;
    frame[3] = 0xFF;

    assert_eq!(
        decode_frame(vec![frame.into()]).unwrap_err(),
        ProtocolError::UnknownMessageType { code: 0x7FFF }
    );
}

#[test]
fn test_wrong_header_length_produces_no_frame() {
    let mut frame = encode_frame(build_for_send(MessageType::Ping, 0), b"body").to_vec();
    frame[1] = 3;

    let err = decode_frame(vec![frame.into()]).unwrap_err();
    assert_eq!(
        err,
        ProtocolError::InvalidHeaderLength {
            declared_words: 3,
            expected_words: 2
        }
    );
    assert!(err.is_framing_error());
}

#[test]
fn test_truncated_header_segment() {
    let err = decode_frame(vec![Bytes::from_static(&[1, 2, 0])]).unwrap_err();
    assert!(matches!(err, ProtocolError::MessageTooSmall { need: 8, got: 3, .. }));
}
