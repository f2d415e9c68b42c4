//! Built-in Messages
//!
//! `PING_MESSAGE` and `PONG_MESSAGE` carry a sequence number and a short
//! payload string. A node answers each ping with a pong echoing both.

use codec::{BodyBuilder, BodyReader, ProtocolResult};
use types::MessageType;

use super::factory::{MessageFactory, MessageMapping};
use super::message::{MessageEnvelope, TcMessage, WireMessage};
use crate::error::FactoryError;

macro_rules! echo_message {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub struct $name {
            envelope: MessageEnvelope,
            pub sequence: u64,
            pub payload: String,
        }

        impl $name {
            pub fn set(&mut self, sequence: u64, payload: impl Into<String>) -> &mut Self {
                self.sequence = sequence;
                self.payload = payload.into();
                self
            }
        }

        impl TcMessage for $name {
            fn envelope(&self) -> &MessageEnvelope {
                &self.envelope
            }

            fn envelope_mut(&mut self) -> &mut MessageEnvelope {
                &mut self.envelope
            }

            fn encode_body(&self, body: &mut BodyBuilder) {
                body.put_u64(self.sequence).put_str(&self.payload);
            }

            fn decode_body(&mut self, body: &mut BodyReader) -> ProtocolResult<()> {
                self.sequence = body.get_u64()?;
                self.payload = body.get_string()?;
                Ok(())
            }
        }

        impl WireMessage for $name {
            fn from_envelope(envelope: MessageEnvelope) -> Self {
                Self {
                    envelope,
                    sequence: 0,
                    payload: String::new(),
                }
            }
        }
    };
}

echo_message!(
    /// Liveness check
    PingMessage
);

echo_message!(
    /// Reply to a [`PingMessage`]
    PongMessage
);

/// Map PING and PONG in both directions.
pub fn register_builtin_messages(factory: &MessageFactory) -> Result<(), FactoryError> {
    factory.add_class_mapping(MessageType::Ping, MessageMapping::of::<PingMessage>())?;
    factory.add_class_mapping(MessageType::Pong, MessageMapping::of::<PongMessage>())?;
    Ok(())
}
