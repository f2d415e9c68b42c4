//! Client Channel
//!
//! Dials a server through its transport. The channel object outlives individual
//! connections: after a disconnect the owner calls [`reset`](ClientMessageChannel::reset)
//! and [`open`](ClientMessageChannel::open) again, and the transport re-presents
//! the connection id it was given the first time.
//!
//! Every disconnect starts a new session. A message built before the disconnect
//! still carries the old session and is dropped at send time instead of being
//! replayed onto the new connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, warn};
use types::{ChannelId, ConnectionId};

use super::shared::{delegate_to_core, ChannelCore};
use super::{ChannelEventType, ChannelLifecycle, MessageChannel};
use crate::error::ChannelError;
use crate::protocol::{BoxedMessage, MessageFactory};
use crate::routing::MessageRouter;
use crate::transports::{NetworkLayer, ReceiveLayer};

pub struct ClientMessageChannel {
    core: ChannelCore,
    opening: AtomicBool,
}

impl ClientMessageChannel {
    pub fn new(
        transport: Arc<dyn NetworkLayer>,
        factory: Arc<MessageFactory>,
        router: Arc<MessageRouter>,
    ) -> Arc<Self> {
        let channel = Arc::new_cyclic(|weak: &Weak<Self>| {
            let self_ref: Weak<dyn MessageChannel> = weak.clone();
            Self {
                core: ChannelCore::new(ChannelId::NULL, transport.clone(), factory, router, self_ref),
                opening: AtomicBool::new(false),
            }
        });
        let weak: Weak<Self> = Arc::downgrade(&channel);
        let receive_layer: Weak<dyn ReceiveLayer> = weak;
        transport.set_receive_layer(receive_layer);
        channel
    }

    /// Connect the transport and move INIT → OPEN.
    ///
    /// Fails with `IllegalTransition` unless the channel is in INIT and no other
    /// `open()` is in progress.
    pub async fn open(&self) -> Result<ChannelId, ChannelError> {
        if self.opening.swap(true, Ordering::AcqRel) {
            return Err(ChannelError::illegal_transition(
                self.core.channel_id(),
                "open",
                self.core.status.lifecycle(),
            ));
        }
        let result = self.open_transport().await;
        self.opening.store(false, Ordering::Release);
        result
    }

    async fn open_transport(&self) -> Result<ChannelId, ChannelError> {
        let lifecycle = self.core.status.lifecycle();
        if lifecycle != ChannelLifecycle::Init {
            return Err(ChannelError::illegal_transition(
                self.core.channel_id(),
                "open",
                lifecycle,
            ));
        }

        let transport = self.core.transport();
        let connection_id = transport.open().await?;

        if let Err(e) = self.core.status.open() {
            // closed while the transport was connecting
            transport.close();
            return Err(e);
        }
        let channel_id = self.core.status.assign_channel_id(ChannelId::from(connection_id));
        info!(
            channel = %channel_id,
            session = %self.core.status.session_id(),
            remote = ?transport.remote_address(),
            "Client channel open"
        );
        self.core.fire(ChannelEventType::TransportConnected);
        Ok(channel_id)
    }

    /// Return to INIT and reset the transport, ready for another `open()`.
    pub fn reset(&self) -> Result<(), ChannelError> {
        self.core.status.reset()?;
        let transport = self.core.transport();
        if transport.is_connected() {
            // the transport will not report this loss itself
            let session = self.core.status.next_session();
            debug!(channel = %self.core.channel_id(), %session, "Reset while connected, new session");
        }
        transport.reset();
        Ok(())
    }

    pub fn connect_count(&self) -> u64 {
        self.core.status.connect_count()
    }

    pub fn connect_attempt_count(&self) -> u64 {
        self.core.status.connect_attempt_count()
    }
}

#[async_trait]
impl MessageChannel for ClientMessageChannel {
    delegate_to_core!();

    /// Closed channels raise; messages stamped with an older session are
    /// dropped without error.
    async fn send(&self, message: BoxedMessage) -> Result<(), ChannelError> {
        self.core.ensure_not_closed()?;

        let current = self.core.status.session_id();
        if message.session_id() != current {
            debug!(
                channel = %self.core.channel_id(),
                message_type = %message.message_type(),
                stamped = %message.session_id(),
                %current,
                "Dropping message from stale session"
            );
            return Ok(());
        }

        self.core.ensure_open()?;
        self.core.transmit(&message).await
    }
}

impl ReceiveLayer for ClientMessageChannel {
    fn receive(&self, segments: Vec<Bytes>) {
        self.core.receive(segments);
    }

    fn notify_transport_connected(&self, connection_id: ConnectionId) {
        self.core.status.assign_channel_id(ChannelId::from(connection_id));
        self.core.status.record_connect();
        // a connect during open() is announced once the channel is OPEN
        if self.core.status.lifecycle() == ChannelLifecycle::Open {
            self.core.fire(ChannelEventType::TransportConnected);
        }
    }

    fn notify_transport_disconnected(&self, connection_id: ConnectionId) {
        let session = self.core.status.next_session();
        warn!(channel = %self.core.channel_id(), connection = %connection_id, %session, "Client transport disconnected");
        self.core.fire(ChannelEventType::TransportDisconnected);
    }

    fn notify_transport_connect_attempt(&self) {
        let attempts = self.core.status.record_connect_attempt();
        debug!(channel = %self.core.channel_id(), attempts, "Client connect attempt");
    }

    fn notify_transport_closed(&self) {
        debug!(channel = %self.core.channel_id(), "Client transport closed");
    }
}
