//! Message Factory
//!
//! Each message type registers a [`MessageMapping`] naming the strategies it
//! supports: build-from-scratch for sending, build-from-wire for receiving, or
//! both. Registration is explicit and checked once; a type without a mapping
//! simply cannot be constructed.

use std::fmt;
use std::sync::Arc;

use codec::WireFrame;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;
use types::MessageType;

use super::message::{BoxedMessage, MessageEnvelope, WireMessage};
use super::monitor::MessageMonitor;
use crate::channel::MessageChannel;
use crate::error::{Direction, FactoryError};

/// Builds a typed message around a prepared envelope
pub type MessageBuilderFn = Arc<dyn Fn(MessageEnvelope) -> BoxedMessage + Send + Sync>;

/// Construction strategies registered for one message type
#[derive(Clone, Default)]
pub struct MessageMapping {
    pub outbound: Option<MessageBuilderFn>,
    pub inbound: Option<MessageBuilderFn>,
}

impl MessageMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outbound<F>(mut self, build: F) -> Self
    where
        F: Fn(MessageEnvelope) -> BoxedMessage + Send + Sync + 'static,
    {
        self.outbound = Some(Arc::new(build));
        self
    }

    pub fn with_inbound<F>(mut self, build: F) -> Self
    where
        F: Fn(MessageEnvelope) -> BoxedMessage + Send + Sync + 'static,
    {
        self.inbound = Some(Arc::new(build));
        self
    }

    /// Both strategies, from the message's own constructor
    pub fn of<M: WireMessage + 'static>() -> Self {
        Self::outbound_only::<M>()
            .with_inbound(|envelope| Box::new(M::from_envelope(envelope)) as BoxedMessage)
    }

    pub fn outbound_only<M: WireMessage + 'static>() -> Self {
        Self::new().with_outbound(|envelope| Box::new(M::from_envelope(envelope)) as BoxedMessage)
    }

    pub fn inbound_only<M: WireMessage + 'static>() -> Self {
        Self::new().with_inbound(|envelope| Box::new(M::from_envelope(envelope)) as BoxedMessage)
    }

    /// `(outbound, inbound)` support
    pub fn capabilities(&self) -> (bool, bool) {
        (self.outbound.is_some(), self.inbound.is_some())
    }
}

impl fmt::Debug for MessageMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (outbound, inbound) = self.capabilities();
        f.debug_struct("MessageMapping")
            .field("outbound", &outbound)
            .field("inbound", &inbound)
            .finish()
    }
}

/// Type → construction strategies for one channel family
pub struct MessageFactory {
    mappings: DashMap<MessageType, MessageMapping>,
    monitor: Arc<dyn MessageMonitor>,
}

impl MessageFactory {
    pub fn new(monitor: Arc<dyn MessageMonitor>) -> Self {
        Self {
            mappings: DashMap::new(),
            monitor,
        }
    }

    /// Register the strategies for `message_type`. The first mapping for a type wins.
    pub fn add_class_mapping(
        &self,
        message_type: MessageType,
        mapping: MessageMapping,
    ) -> Result<(), FactoryError> {
        if mapping.outbound.is_none() && mapping.inbound.is_none() {
            return Err(FactoryError::Unmappable { message_type });
        }

        match self.mappings.entry(message_type) {
            Entry::Occupied(_) => Err(FactoryError::AlreadyMapped { message_type }),
            Entry::Vacant(slot) => {
                debug!(%message_type, capabilities = ?mapping.capabilities(), "Registered message mapping");
                slot.insert(mapping);
                Ok(())
            }
        }
    }

    /// New empty message stamped with the channel's current session.
    pub fn create_outbound(
        &self,
        channel: Arc<dyn MessageChannel>,
        message_type: MessageType,
    ) -> Result<BoxedMessage, FactoryError> {
        let build = self.strategy(message_type, Direction::Outbound)?;
        let session = channel.session_id();
        self.monitor.new_message(Direction::Outbound, message_type);
        Ok(build(MessageEnvelope::outbound(
            message_type,
            session,
            channel,
            self.monitor.clone(),
        )))
    }

    /// Message around a decoded frame. The body stays undecoded until hydration.
    pub fn create_inbound(
        &self,
        channel: Arc<dyn MessageChannel>,
        frame: WireFrame,
    ) -> Result<BoxedMessage, FactoryError> {
        let WireFrame {
            header,
            message_type,
            body,
        } = frame;
        let build = self.strategy(message_type, Direction::Inbound)?;
        let session = channel.session_id();
        self.monitor.new_message(Direction::Inbound, message_type);
        Ok(build(MessageEnvelope::inbound(
            message_type,
            header,
            body,
            session,
            channel,
            self.monitor.clone(),
        )))
    }

    fn strategy(
        &self,
        message_type: MessageType,
        direction: Direction,
    ) -> Result<MessageBuilderFn, FactoryError> {
        let mapping = self
            .mappings
            .get(&message_type)
            .ok_or(FactoryError::NoMapping { message_type })?;
        let build = match direction {
            Direction::Outbound => mapping.outbound.clone(),
            Direction::Inbound => mapping.inbound.clone(),
        };
        build.ok_or(FactoryError::UnsupportedOperation {
            message_type,
            direction,
        })
    }

    /// `(outbound, inbound)` support, `None` when unmapped
    pub fn capabilities(&self, message_type: MessageType) -> Option<(bool, bool)> {
        self.mappings
            .get(&message_type)
            .map(|mapping| mapping.capabilities())
    }

    pub fn is_mapped(&self, message_type: MessageType) -> bool {
        self.mappings.contains_key(&message_type)
    }

    pub fn mapped_types(&self) -> Vec<MessageType> {
        let mut types: Vec<_> = self.mappings.iter().map(|entry| *entry.key()).collect();
        types.sort();
        types
    }

    pub fn monitor(&self) -> &Arc<dyn MessageMonitor> {
        &self.monitor
    }
}

impl fmt::Debug for MessageFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageFactory")
            .field("mapped_types", &self.mapped_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::{PingMessage, PongMessage};
    use crate::protocol::monitor::NullMessageMonitor;

    fn factory() -> MessageFactory {
        MessageFactory::new(Arc::new(NullMessageMonitor))
    }

    #[test]
    fn test_duplicate_mapping_keeps_first() {
        let factory = factory();
        factory
            .add_class_mapping(MessageType::Ping, MessageMapping::inbound_only::<PingMessage>())
            .unwrap();

        let err = factory
            .add_class_mapping(MessageType::Ping, MessageMapping::of::<PingMessage>())
            .unwrap_err();
        assert_eq!(err, FactoryError::AlreadyMapped { message_type: MessageType::Ping });
        assert_eq!(factory.capabilities(MessageType::Ping), Some((false, true)));
    }

    #[test]
    fn test_empty_mapping_rejected() {
        let factory = factory();
        let err = factory
            .add_class_mapping(MessageType::Pong, MessageMapping::new())
            .unwrap_err();
        assert_eq!(err, FactoryError::Unmappable { message_type: MessageType::Pong });
        assert!(!factory.is_mapped(MessageType::Pong));
    }

    #[test]
    fn test_capabilities_listing() {
        let factory = factory();
        factory
            .add_class_mapping(MessageType::Pong, MessageMapping::outbound_only::<PongMessage>())
            .unwrap();
        factory
            .add_class_mapping(MessageType::Ping, MessageMapping::of::<PingMessage>())
            .unwrap();

        assert_eq!(factory.mapped_types(), vec![MessageType::Ping, MessageType::Pong]);
        assert_eq!(factory.capabilities(MessageType::Pong), Some((true, false)));
        assert_eq!(factory.capabilities(MessageType::Bench), None);
    }
}
