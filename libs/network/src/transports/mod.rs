//! Network Layer Abstraction
//!
//! The byte-stream connection beneath a channel. A [`NetworkLayer`] moves whole
//! frames (one header + body per frame) and reports connection events upward
//! through the [`ReceiveLayer`] the channel registers with it.
//!
//! ```text
//! MessageChannel ──send(frame)──▶ NetworkLayer ──▶ socket
//!       ▲                              │
//!       └──receive(segments)/notify_*──┘
//! ```
//!
//! Two implementations ship with the crate: [`TcpNetworkLayer`] (length-prefixed
//! frames with a connection-id exchange) and [`MemoryNetworkLayer`] (in-process
//! pairs for wiring and tests). Health checks and automatic reconnect belong to
//! the handshake machinery above a transport and are not implemented here.

use std::net::SocketAddr;
use std::sync::Weak;

use async_trait::async_trait;
use bytes::Bytes;
use types::ConnectionId;

use crate::Result;

pub mod memory;
pub mod tcp;

pub use memory::MemoryNetworkLayer;
pub use tcp::{PendingConnection, TcpNetworkConfig, TcpNetworkLayer};

/// Connection-oriented frame transport
#[async_trait]
pub trait NetworkLayer: Send + Sync + std::fmt::Debug {
    /// Register the upcall target for received frames and connection events.
    fn set_receive_layer(&self, layer: Weak<dyn ReceiveLayer>);

    /// Establish (or activate) the connection and return its id.
    async fn open(&self) -> Result<ConnectionId>;

    /// Send one complete frame.
    async fn send(&self, frame: Bytes) -> Result<()>;

    /// Tear the connection down for good.
    fn close(&self);

    /// Drop the current connection but keep its identity, ready for `open()`.
    fn reset(&self);

    fn is_connected(&self) -> bool;

    fn local_address(&self) -> Option<SocketAddr>;

    fn remote_address(&self) -> Option<SocketAddr>;
}

/// Upcalls from a transport into the channel above it
pub trait ReceiveLayer: Send + Sync {
    /// One logical message, possibly split across several buffers.
    fn receive(&self, segments: Vec<Bytes>);

    fn notify_transport_connected(&self, connection_id: ConnectionId);

    fn notify_transport_disconnected(&self, connection_id: ConnectionId);

    fn notify_transport_connect_attempt(&self);

    fn notify_transport_closed(&self);
}
