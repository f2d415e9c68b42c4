//! Server Channel
//!
//! One per accepted connection, created and owned by a
//! [`ChannelManager`](crate::ChannelManager). The channel id is known up front
//! (it is the connection id the listener assigned) and the channel opens when
//! its transport reports the connection.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info};
use types::{ChannelId, ConnectionId};

use super::shared::{delegate_to_core, ChannelCore};
use super::{ChannelEventType, ChannelLifecycle, MessageChannel};
use crate::error::ChannelError;
use crate::protocol::{BoxedMessage, MessageFactory};
use crate::routing::MessageRouter;
use crate::transports::{NetworkLayer, ReceiveLayer};

pub struct ServerMessageChannel {
    core: ChannelCore,
}

impl ServerMessageChannel {
    pub fn new(
        channel_id: ChannelId,
        transport: Arc<dyn NetworkLayer>,
        factory: Arc<MessageFactory>,
        router: Arc<MessageRouter>,
    ) -> Arc<Self> {
        let channel = Arc::new_cyclic(|weak: &Weak<Self>| {
            let self_ref: Weak<dyn MessageChannel> = weak.clone();
            Self {
                core: ChannelCore::new(channel_id, transport.clone(), factory, router, self_ref),
            }
        });
        channel.bind(&transport);
        channel
    }

    fn bind(self: &Arc<Self>, transport: &Arc<dyn NetworkLayer>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let receive_layer: Weak<dyn ReceiveLayer> = weak;
        transport.set_receive_layer(receive_layer);
    }

    /// Move a reconnecting client onto this channel. The previous transport is closed.
    pub fn attach_transport(self: &Arc<Self>, transport: Arc<dyn NetworkLayer>) -> Result<(), ChannelError> {
        self.core.ensure_not_closed()?;
        self.bind(&transport);
        let previous = self.core.replace_transport(transport);
        previous.close();
        debug!(channel = %self.core.channel_id(), "Attached new transport");
        Ok(())
    }
}

#[async_trait]
impl MessageChannel for ServerMessageChannel {
    delegate_to_core!();

    async fn send(&self, message: BoxedMessage) -> Result<(), ChannelError> {
        self.core.ensure_open()?;
        self.core.transmit(&message).await
    }
}

impl ReceiveLayer for ServerMessageChannel {
    fn receive(&self, segments: Vec<Bytes>) {
        self.core.receive(segments);
    }

    fn notify_transport_connected(&self, connection_id: ConnectionId) {
        self.core.status.record_connect();
        if self.core.status.lifecycle() == ChannelLifecycle::Init {
            if let Err(e) = self.core.status.open() {
                debug!(channel = %self.core.channel_id(), error = %e, "Connected channel could not open");
                return;
            }
            info!(channel = %self.core.channel_id(), connection = %connection_id, "Server channel open");
        }
        if self.core.status.lifecycle() == ChannelLifecycle::Open {
            self.core.fire(ChannelEventType::TransportConnected);
        }
    }

    fn notify_transport_disconnected(&self, connection_id: ConnectionId) {
        info!(channel = %self.core.channel_id(), connection = %connection_id, "Server transport disconnected");
        self.core.fire(ChannelEventType::TransportDisconnected);
    }

    fn notify_transport_connect_attempt(&self) {
        self.core.status.record_connect_attempt();
    }

    fn notify_transport_closed(&self) {
        debug!(channel = %self.core.channel_id(), "Server transport closed");
    }
}
