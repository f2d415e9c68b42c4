//! Behaviour shared by client and server channels

use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, error, info};
use types::{ChannelId, MessageType};

use super::listeners::ListenerSet;
use super::state::ChannelStatus;
use super::{ChannelEvent, ChannelEventListener, ChannelEventType, ChannelLifecycle, MessageChannel};
use crate::error::{ChannelError, Direction};
use crate::protocol::{BoxedMessage, MessageFactory, MessageParser};
use crate::routing::MessageRouter;
use crate::transports::NetworkLayer;

pub(crate) struct ChannelCore {
    pub(crate) status: ChannelStatus,
    listeners: ListenerSet<dyn ChannelEventListener>,
    transport: RwLock<Arc<dyn NetworkLayer>>,
    factory: Arc<MessageFactory>,
    parser: MessageParser,
    router: Arc<MessageRouter>,
    self_ref: Weak<dyn MessageChannel>,
}

impl ChannelCore {
    pub(crate) fn new(
        channel_id: ChannelId,
        transport: Arc<dyn NetworkLayer>,
        factory: Arc<MessageFactory>,
        router: Arc<MessageRouter>,
        self_ref: Weak<dyn MessageChannel>,
    ) -> Self {
        Self {
            status: ChannelStatus::new(channel_id),
            listeners: ListenerSet::new(),
            transport: RwLock::new(transport),
            parser: MessageParser::new(factory.clone()),
            factory,
            router,
            self_ref,
        }
    }

    pub(crate) fn channel_id(&self) -> ChannelId {
        self.status.channel_id()
    }

    pub(crate) fn transport(&self) -> Arc<dyn NetworkLayer> {
        self.transport.read().clone()
    }

    /// Swap in a new transport, returning the old one.
    pub(crate) fn replace_transport(&self, transport: Arc<dyn NetworkLayer>) -> Arc<dyn NetworkLayer> {
        std::mem::replace(&mut *self.transport.write(), transport)
    }

    pub(crate) fn add_listener(&self, listener: Arc<dyn ChannelEventListener>) {
        self.listeners.add(listener);
    }

    /// Notify listeners. Never called with a lock held.
    pub(crate) fn fire(&self, event_type: ChannelEventType) {
        let Some(channel) = self.self_ref.upgrade() else {
            return;
        };
        let event = ChannelEvent {
            event_type,
            channel,
        };
        debug!(channel = %self.channel_id(), event = %event_type, "Channel event");
        for listener in self.listeners.snapshot().iter() {
            listener.notify_channel_event(&event);
        }
    }

    pub(crate) fn create_message(&self, message_type: MessageType) -> Result<BoxedMessage, ChannelError> {
        let closed = ChannelError::Closed {
            channel: self.channel_id(),
        };
        if self.status.lifecycle() == ChannelLifecycle::Closed {
            return Err(closed);
        }
        let channel = self.self_ref.upgrade().ok_or(closed)?;
        Ok(self.factory.create_outbound(channel, message_type)?)
    }

    pub(crate) fn ensure_not_closed(&self) -> Result<(), ChannelError> {
        match self.status.lifecycle() {
            ChannelLifecycle::Closed => Err(ChannelError::Closed {
                channel: self.channel_id(),
            }),
            _ => Ok(()),
        }
    }

    pub(crate) fn ensure_open(&self) -> Result<(), ChannelError> {
        match self.status.lifecycle() {
            ChannelLifecycle::Open => Ok(()),
            ChannelLifecycle::Closed => Err(ChannelError::Closed {
                channel: self.channel_id(),
            }),
            state @ ChannelLifecycle::Init => Err(ChannelError::NotOpen {
                channel: self.channel_id(),
                state,
            }),
        }
    }

    /// Serialize and hand one message to the transport.
    pub(crate) async fn transmit(&self, message: &BoxedMessage) -> Result<(), ChannelError> {
        let frame: Bytes = message.dehydrate();
        let message_type = message.message_type();
        self.factory
            .monitor()
            .message_bytes(Direction::Outbound, message_type, frame.len());
        debug!(channel = %self.channel_id(), %message_type, bytes = frame.len(), "Sending message");

        let transport = self.transport();
        transport.send(frame).await?;
        Ok(())
    }

    /// Parse one received frame and route it. A frame that fails to parse
    /// closes the channel.
    pub(crate) fn receive(&self, segments: Vec<Bytes>) {
        let Some(channel) = self.self_ref.upgrade() else {
            return;
        };
        match self.parser.parse(channel, segments) {
            Ok(message) => {
                let message_type = message.message_type();
                if let Err(e) = self.router.put_message(message) {
                    error!(channel = %self.channel_id(), %message_type, error = %e, "Failed to route message");
                }
            }
            Err(e) => {
                error!(channel = %self.channel_id(), error = %e, "Protocol error, closing channel");
                self.close();
            }
        }
    }

    pub(crate) fn close(&self) {
        if self.status.close_once() {
            info!(channel = %self.channel_id(), "Closing channel");
            self.transport().close();
            self.fire(ChannelEventType::ChannelClosed);
        }
    }
}

/// `MessageChannel` methods identical for every channel kind. Expects a
/// `core: ChannelCore` field.
macro_rules! delegate_to_core {
    () => {
        fn channel_id(&self) -> types::ChannelId {
            self.core.channel_id()
        }

        fn session_id(&self) -> types::SessionId {
            self.core.status.session_id()
        }

        fn lifecycle(&self) -> $crate::channel::ChannelLifecycle {
            self.core.status.lifecycle()
        }

        fn is_connected(&self) -> bool {
            self.core.transport().is_connected()
        }

        fn local_address(&self) -> Option<std::net::SocketAddr> {
            self.core.transport().local_address()
        }

        fn remote_address(&self) -> Option<std::net::SocketAddr> {
            self.core.transport().remote_address()
        }

        fn create_message(
            &self,
            message_type: types::MessageType,
        ) -> Result<$crate::protocol::BoxedMessage, $crate::error::ChannelError> {
            self.core.create_message(message_type)
        }

        fn close(&self) {
            self.core.close();
        }

        fn add_listener(&self, listener: std::sync::Arc<dyn $crate::channel::ChannelEventListener>) {
            self.core.add_listener(listener);
        }

        fn add_attachment(
            &self,
            key: &str,
            value: $crate::channel::Attachment,
            replace: bool,
        ) -> Option<$crate::channel::Attachment> {
            self.core.status.add_attachment(key, value, replace)
        }

        fn get_attachment(&self, key: &str) -> Option<$crate::channel::Attachment> {
            self.core.status.get_attachment(key)
        }

        fn remove_attachment(&self, key: &str) -> Option<$crate::channel::Attachment> {
            self.core.status.remove_attachment(key)
        }
    };
}

pub(crate) use delegate_to_core;
