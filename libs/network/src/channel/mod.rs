//! Message Channels
//!
//! A channel is the application-facing end of one logical connection. It owns
//! a [`NetworkLayer`](crate::transports::NetworkLayer), turns typed messages into
//! frames on the way out, parses frames into typed messages on the way in, and
//! hands received messages to the router.
//!
//! ## Lifecycle
//!
//! ```text
//! INIT ──open()──▶ OPEN ──close()──▶ CLOSED
//!   └─────────────close()─────────────▶┘
//! ```
//!
//! Transitions are forward-only and run under the channel's single state lock.
//! Close side effects run at most once however many callers race to close.
//!
//! ## Variants
//!
//! - [`ClientMessageChannel`]: dials out, survives reconnects via `reset()`,
//!   bumps its session on every disconnect and drops outbound messages built
//!   for an older session
//! - [`ServerMessageChannel`]: created by the [`ChannelManager`](crate::ChannelManager)
//!   for each accepted connection

use std::any::Any;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use types::{ChannelId, MessageType, SessionId};

use crate::error::ChannelError;
use crate::protocol::BoxedMessage;

mod client;
mod listeners;
mod server;
mod shared;
mod state;

pub use client::ClientMessageChannel;
pub use listeners::ListenerSet;
pub use server::ServerMessageChannel;
pub use state::ChannelStatus;

/// Forward-only channel lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelLifecycle {
    Init,
    Open,
    Closed,
}

/// Lifecycle events a channel publishes to its listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelEventType {
    TransportConnected,
    TransportDisconnected,
    ChannelClosed,
}

impl fmt::Display for ChannelEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelEventType::TransportConnected => f.write_str("TRANSPORT_CONNECTED"),
            ChannelEventType::TransportDisconnected => f.write_str("TRANSPORT_DISCONNECTED"),
            ChannelEventType::ChannelClosed => f.write_str("CHANNEL_CLOSED"),
        }
    }
}

#[derive(Clone)]
pub struct ChannelEvent {
    pub event_type: ChannelEventType,
    pub channel: Arc<dyn MessageChannel>,
}

impl fmt::Debug for ChannelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelEvent")
            .field("event_type", &self.event_type)
            .field("channel", &self.channel.channel_id())
            .finish()
    }
}

pub trait ChannelEventListener: Send + Sync {
    fn notify_channel_event(&self, event: &ChannelEvent);
}

/// Value stored in a channel's attachment map
pub type Attachment = Arc<dyn Any + Send + Sync>;

/// Application view of a channel
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Null until the first successful connection
    fn channel_id(&self) -> ChannelId;

    fn session_id(&self) -> SessionId;

    fn lifecycle(&self) -> ChannelLifecycle;

    fn is_open(&self) -> bool {
        self.lifecycle() == ChannelLifecycle::Open
    }

    fn is_closed(&self) -> bool {
        self.lifecycle() == ChannelLifecycle::Closed
    }

    /// Whether the underlying transport currently has a live connection
    fn is_connected(&self) -> bool;

    fn local_address(&self) -> Option<SocketAddr>;

    fn remote_address(&self) -> Option<SocketAddr>;

    /// New outbound message stamped with the current session.
    fn create_message(&self, message_type: MessageType) -> Result<BoxedMessage, ChannelError>;

    /// Serialize and hand the message to the transport.
    async fn send(&self, message: BoxedMessage) -> Result<(), ChannelError>;

    /// Close the channel and its transport. Idempotent.
    fn close(&self);

    fn add_listener(&self, listener: Arc<dyn ChannelEventListener>);

    /// Store `value` under `key`. With `replace` false an existing value is
    /// kept. Returns the value previously stored.
    fn add_attachment(&self, key: &str, value: Attachment, replace: bool) -> Option<Attachment>;

    fn get_attachment(&self, key: &str) -> Option<Attachment>;

    fn remove_attachment(&self, key: &str) -> Option<Attachment>;
}
