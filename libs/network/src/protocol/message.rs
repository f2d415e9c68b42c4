//! Message Envelope and Trait
//!
//! Every typed message embeds a [`MessageEnvelope`]: its type, the session it
//! was built for, the channel it belongs to, and, for inbound messages, the
//! received header plus the body segments not yet decoded.
//!
//! Outbound messages are built incrementally (create, populate fields, send) and
//! serialized by [`dehydrate`](TcMessage::dehydrate). Inbound messages arrive
//! fully formed but keep their body as raw segments until
//! [`hydrate`](TcMessage::hydrate) decodes it, usually on a hydration stage
//! worker rather than the network reader.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use codec::{build_for_send, encode_frame, BodyBuilder, BodyReader, ProtocolResult};
use types::{ChannelId, MessageHeader, MessageType, SessionId};

use super::monitor::MessageMonitor;
use crate::channel::MessageChannel;
use crate::error::Direction;

/// Owned, type-erased message
pub type BoxedMessage = Box<dyn TcMessage>;

/// State shared by every message regardless of its payload
pub struct MessageEnvelope {
    message_type: MessageType,
    type_version: u16,
    session: SessionId,
    channel: Arc<dyn MessageChannel>,
    monitor: Arc<dyn MessageMonitor>,
    direction: Direction,
    header: Option<MessageHeader>,
    /// Undecoded body, present until the message is hydrated
    pending_body: Option<Vec<Bytes>>,
}

impl MessageEnvelope {
    /// Envelope for a message the application is about to populate and send
    pub fn outbound(
        message_type: MessageType,
        session: SessionId,
        channel: Arc<dyn MessageChannel>,
        monitor: Arc<dyn MessageMonitor>,
    ) -> Self {
        Self {
            message_type,
            type_version: 0,
            session,
            channel,
            monitor,
            direction: Direction::Outbound,
            header: None,
            pending_body: None,
        }
    }

    /// Envelope for a message received off the wire
    pub fn inbound(
        message_type: MessageType,
        header: MessageHeader,
        body: Vec<Bytes>,
        session: SessionId,
        channel: Arc<dyn MessageChannel>,
        monitor: Arc<dyn MessageMonitor>,
    ) -> Self {
        Self {
            message_type,
            type_version: header.type_version(),
            session,
            channel,
            monitor,
            direction: Direction::Inbound,
            header: Some(header),
            pending_body: Some(body),
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn type_version(&self) -> u16 {
        self.type_version
    }

    pub fn set_type_version(&mut self, version: u16) {
        self.type_version = version;
    }

    /// Session stamped at construction
    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn channel(&self) -> &Arc<dyn MessageChannel> {
        &self.channel
    }

    pub fn monitor(&self) -> &Arc<dyn MessageMonitor> {
        &self.monitor
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Received header, `None` for outbound messages
    pub fn header(&self) -> Option<&MessageHeader> {
        self.header.as_ref()
    }

    pub fn pending_body_len(&self) -> usize {
        self.pending_body
            .as_ref()
            .map(|segments| segments.iter().map(Bytes::len).sum())
            .unwrap_or(0)
    }

    fn take_pending_body(&mut self) -> Option<Vec<Bytes>> {
        self.pending_body.take()
    }
}

impl fmt::Debug for MessageEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageEnvelope")
            .field("message_type", &self.message_type)
            .field("type_version", &self.type_version)
            .field("session", &self.session)
            .field("channel", &self.channel.channel_id())
            .field("direction", &self.direction)
            .field("hydrated", &self.pending_body.is_none())
            .finish()
    }
}

/// Upcast helper so boxed messages can be downcast to their concrete type
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A typed wire message
pub trait TcMessage: AsAny + Send + Sync + fmt::Debug {
    fn envelope(&self) -> &MessageEnvelope;

    fn envelope_mut(&mut self) -> &mut MessageEnvelope;

    /// Write the payload fields in wire order.
    fn encode_body(&self, body: &mut BodyBuilder);

    /// Read the payload fields written by `encode_body`.
    fn decode_body(&mut self, body: &mut BodyReader) -> ProtocolResult<()>;
}

impl dyn TcMessage {
    pub fn message_type(&self) -> MessageType {
        self.envelope().message_type()
    }

    pub fn session_id(&self) -> SessionId {
        self.envelope().session()
    }

    pub fn channel(&self) -> &Arc<dyn MessageChannel> {
        self.envelope().channel()
    }

    pub fn channel_id(&self) -> ChannelId {
        self.envelope().channel().channel_id()
    }

    /// `true` once the body has been decoded (always for outbound messages)
    pub fn is_hydrated(&self) -> bool {
        self.envelope().pending_body.is_none()
    }

    /// Decode the pending body into the message fields. A second call is a no-op.
    pub fn hydrate(&mut self) -> ProtocolResult<()> {
        let Some(segments) = self.envelope_mut().take_pending_body() else {
            return Ok(());
        };
        let mut reader = BodyReader::new(segments);
        self.decode_body(&mut reader)
    }

    /// Serialize header and body into one frame.
    pub fn dehydrate(&self) -> Bytes {
        let mut body = BodyBuilder::new();
        self.encode_body(&mut body);
        let envelope = self.envelope();
        let header = build_for_send(envelope.message_type(), envelope.type_version());
        encode_frame(header, body.as_slice())
    }

    pub fn downcast_ref<M: TcMessage + 'static>(&self) -> Option<&M> {
        self.as_any().downcast_ref::<M>()
    }

    pub fn downcast_mut<M: TcMessage + 'static>(&mut self) -> Option<&mut M> {
        self.as_any_mut().downcast_mut::<M>()
    }
}

/// A message that can be built from a bare envelope, so one function covers
/// both construction strategies.
pub trait WireMessage: TcMessage + Sized {
    fn from_envelope(envelope: MessageEnvelope) -> Self;
}
