//! Message Parser
//!
//! Receive segments in, typed message out. Framing steps run in
//! [`codec::decode_frame`]; the final step hands the frame to the factory's
//! inbound strategy. Any error leaves no message behind and the caller tears
//! the channel down.

use std::sync::Arc;

use bytes::Bytes;
use codec::decode_frame;
use tracing::debug;
use types::HEADER_LENGTH;

use super::factory::MessageFactory;
use super::message::BoxedMessage;
use crate::channel::MessageChannel;
use crate::error::{ChannelError, Direction};

#[derive(Debug, Clone)]
pub struct MessageParser {
    factory: Arc<MessageFactory>,
}

impl MessageParser {
    pub fn new(factory: Arc<MessageFactory>) -> Self {
        Self { factory }
    }

    pub fn parse(
        &self,
        channel: Arc<dyn MessageChannel>,
        segments: Vec<Bytes>,
    ) -> Result<BoxedMessage, ChannelError> {
        let frame = decode_frame(segments)?;
        let message_type = frame.message_type;
        self.factory.monitor().message_bytes(
            Direction::Inbound,
            message_type,
            HEADER_LENGTH + frame.body_len(),
        );
        debug!(channel = %channel.channel_id(), %message_type, body = frame.body_len(), "Parsed frame");
        Ok(self.factory.create_inbound(channel, frame)?)
    }

    pub fn factory(&self) -> &Arc<MessageFactory> {
        &self.factory
    }
}
