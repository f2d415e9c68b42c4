//! Property tests for the wire header codec

use codec::{build_for_send, decode_frame, encode_frame, validate, wrap_for_receive, ProtocolError};
use proptest::prelude::*;
use types::{MessageType, HEADER_WORDS, PROTOCOL_VERSION};
use zerocopy::AsBytes;

fn any_message_type() -> impl Strategy<Value = MessageType> {
    proptest::sample::select(MessageType::ALL.to_vec())
}

proptest! {
    #[test]
    fn header_fields_survive_encoding(
        message_type in any_message_type(),
        type_version in any::<u16>(),
        body in proptest::collection::vec(any::<u8>(), 0..256),
    ) {
        let frame = encode_frame(build_for_send(message_type, type_version), &body);

        let header = wrap_for_receive(&frame).unwrap();
        prop_assert!(validate(header).is_ok());
        prop_assert_eq!(header.version, PROTOCOL_VERSION);
        prop_assert_eq!(header.header_length, HEADER_WORDS);
        prop_assert_eq!(header.type_code(), message_type.code());
        prop_assert_eq!(header.type_version(), type_version);

        let decoded = decode_frame(vec![frame.clone()]).unwrap();
        prop_assert_eq!(decoded.message_type, message_type);
        prop_assert_eq!(decoded.body_len(), body.len());
    }

    #[test]
    fn any_other_header_length_is_rejected(
        message_type in any_message_type(),
        declared in (0u8..=15).prop_filter("fixed length", |w| *w != HEADER_WORDS),
    ) {
        let mut header = build_for_send(message_type, 0);
        header.header_length = declared;
        let mut frame = header.as_bytes().to_vec();
        frame.extend_from_slice(&[0u8; 64]);

        let result = decode_frame(vec![frame.into()]);
        let is_invalid_length = matches!(
            result,
            Err(ProtocolError::InvalidHeaderLength { .. })
        );
        prop_assert!(is_invalid_length);
    }
}
