//! Channel Manager
//!
//! Owns the server channels of one listening endpoint, keyed by channel id.
//! The manager subscribes to each channel it creates and keeps the map in step
//! with channel lifecycle:
//!
//! | Channel event            | Manager reaction                                        |
//! |--------------------------|---------------------------------------------------------|
//! | `TRANSPORT_CONNECTED`    | announce `channel_created`                              |
//! | `TRANSPORT_DISCONNECTED` | close the channel if `transport_disconnect_removes_channel` |
//! | `CHANNEL_CLOSED`         | remove from the map, announce `channel_removed`         |
//!
//! Removal happens synchronously inside `close()`, so a channel found in the
//! map is never observed CLOSED for longer than the close call itself.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use types::ChannelId;

use crate::channel::{
    ChannelEvent, ChannelEventListener, ChannelEventType, ListenerSet, MessageChannel,
    ServerMessageChannel,
};
use crate::error::ChannelError;
use crate::protocol::MessageFactory;
use crate::routing::MessageRouter;
use crate::transports::NetworkLayer;

/// Builds the channel object for an accepted connection
pub trait ServerChannelFactory: Send + Sync {
    fn create_channel(
        &self,
        channel_id: ChannelId,
        transport: Arc<dyn NetworkLayer>,
    ) -> Arc<ServerMessageChannel>;
}

pub struct DefaultServerChannelFactory {
    factory: Arc<MessageFactory>,
    router: Arc<MessageRouter>,
}

impl DefaultServerChannelFactory {
    pub fn new(factory: Arc<MessageFactory>, router: Arc<MessageRouter>) -> Self {
        Self { factory, router }
    }
}

impl ServerChannelFactory for DefaultServerChannelFactory {
    fn create_channel(
        &self,
        channel_id: ChannelId,
        transport: Arc<dyn NetworkLayer>,
    ) -> Arc<ServerMessageChannel> {
        ServerMessageChannel::new(channel_id, transport, self.factory.clone(), self.router.clone())
    }
}

/// Manager-level lifecycle signals
pub trait ChannelManagerEventListener: Send + Sync {
    /// The channel object exists and is registered; its transport may not be connected yet.
    fn channel_constructed(&self, _channel: &Arc<dyn MessageChannel>) {}

    /// The channel's transport connected.
    fn channel_created(&self, channel: &Arc<dyn MessageChannel>);

    fn channel_removed(&self, channel: &Arc<dyn MessageChannel>);
}

pub struct ChannelManager {
    channels: Mutex<HashMap<ChannelId, Arc<ServerMessageChannel>>>,
    channel_factory: Arc<dyn ServerChannelFactory>,
    transport_disconnect_removes_channel: bool,
    event_listeners: ListenerSet<dyn ChannelManagerEventListener>,
    /// Weak subscription handed to every channel
    channel_listener: Arc<dyn ChannelEventListener>,
}

/// Forwards channel events to the manager without keeping it alive
struct ManagerSubscription(Weak<ChannelManager>);

impl ChannelEventListener for ManagerSubscription {
    fn notify_channel_event(&self, event: &ChannelEvent) {
        if let Some(manager) = self.0.upgrade() {
            manager.on_channel_event(event);
        }
    }
}

impl ChannelManager {
    pub fn new(
        channel_factory: Arc<dyn ServerChannelFactory>,
        transport_disconnect_removes_channel: bool,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            channels: Mutex::new(HashMap::new()),
            channel_factory,
            transport_disconnect_removes_channel,
            event_listeners: ListenerSet::new(),
            channel_listener: Arc::new(ManagerSubscription(weak.clone())),
        })
    }

    pub fn add_event_listener(&self, listener: Arc<dyn ChannelManagerEventListener>) {
        self.event_listeners.add(listener);
    }

    pub fn remove_event_listener(&self, listener: &Arc<dyn ChannelManagerEventListener>) -> bool {
        self.event_listeners.remove(listener)
    }

    pub fn transport_disconnect_removes_channel(&self) -> bool {
        self.transport_disconnect_removes_channel
    }

    /// Build, register and subscribe to a channel for `transport`.
    pub fn create_new_channel(
        &self,
        channel_id: ChannelId,
        transport: Arc<dyn NetworkLayer>,
    ) -> Arc<ServerMessageChannel> {
        let channel = self.channel_factory.create_channel(channel_id, transport);
        channel.add_listener(self.channel_listener.clone());

        let previous = self.channels.lock().insert(channel_id, channel.clone());
        if let Some(previous) = previous {
            warn!(channel = %channel_id, "Replacing an existing channel with the same id");
            // already out of the map, so its close event does not announce removal
            previous.close();
            let removed: Arc<dyn MessageChannel> = previous;
            for listener in self.event_listeners.snapshot().iter() {
                listener.channel_removed(&removed);
            }
        }
        debug!(channel = %channel_id, "Channel constructed");

        let announced: Arc<dyn MessageChannel> = channel.clone();
        for listener in self.event_listeners.snapshot().iter() {
            listener.channel_constructed(&announced);
        }
        channel
    }

    /// Registered channel by id. Closed channels are never returned.
    pub fn get_channel(&self, channel_id: ChannelId) -> Option<Arc<ServerMessageChannel>> {
        self.channels
            .lock()
            .get(&channel_id)
            .filter(|channel| !channel.is_closed())
            .cloned()
    }

    pub fn get_channels(&self) -> Vec<Arc<ServerMessageChannel>> {
        let mut channels: Vec<_> = self
            .channels
            .lock()
            .values()
            .filter(|channel| !channel.is_closed())
            .cloned()
            .collect();
        channels.sort_by_key(|channel| channel.channel_id());
        channels
    }

    pub fn is_valid_id(&self, channel_id: ChannelId) -> bool {
        self.get_channel(channel_id).is_some()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }

    /// Close every channel. Each close removes its channel synchronously, so
    /// any channel left afterwards is reported as an error.
    pub fn close_all_channels(&self) -> Result<(), ChannelError> {
        let channels: Vec<_> = self.channels.lock().values().cloned().collect();
        info!(count = channels.len(), "Closing all channels");
        for channel in channels {
            channel.close();
        }

        let remaining = self.channels.lock().len();
        if remaining > 0 {
            return Err(ChannelError::ChannelsRemaining { count: remaining });
        }
        Ok(())
    }

    fn on_channel_event(&self, event: &ChannelEvent) {
        match event.event_type {
            ChannelEventType::ChannelClosed => self.remove_channel(&event.channel),
            ChannelEventType::TransportDisconnected => {
                if self.transport_disconnect_removes_channel {
                    event.channel.close();
                }
            }
            ChannelEventType::TransportConnected => {
                for listener in self.event_listeners.snapshot().iter() {
                    listener.channel_created(&event.channel);
                }
            }
        }
    }

    fn remove_channel(&self, channel: &Arc<dyn MessageChannel>) {
        let channel_id = channel.channel_id();
        let removed = {
            let mut channels = self.channels.lock();
            // only remove the exact instance that closed
            let matches = channels.get(&channel_id).is_some_and(|registered| {
                std::ptr::eq(
                    Arc::as_ptr(registered) as *const u8,
                    Arc::as_ptr(channel) as *const u8,
                )
            });
            if matches {
                channels.remove(&channel_id)
            } else {
                None
            }
        };

        match removed {
            Some(_) => {
                debug!(channel = %channel_id, "Channel removed");
                for listener in self.event_listeners.snapshot().iter() {
                    listener.channel_removed(channel);
                }
            }
            None => {
                debug!(channel = %channel_id, "Closed channel is no longer registered");
            }
        }
    }
}
