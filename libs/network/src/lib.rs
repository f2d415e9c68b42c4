//! Channel Messaging Network Layer
//!
//! Turns a duplex byte stream into typed, routed messages.
//!
//! ```text
//! NetworkLayer ─frames─▶ MessageChannel ─parse─▶ MessageRouter ─▶ sinks / stages
//!      ▲                      │
//!      └──────dehydrate───────┘  (channel.create_message → populate → channel.send)
//! ```
//!
//! ## Modules
//!
//! - [`transports`]: the `NetworkLayer` contract, TCP and in-memory transports
//! - [`protocol`]: message envelope, factory, parser, monitor, PING/PONG
//! - [`channel`]: client and server channels with the INIT → OPEN → CLOSED lifecycle
//! - [`routing`]: router, sinks, keyed worker stages, hydration
//! - [`manager`]: server channel registry for one listening endpoint
//! - [`policy`]: inbound connection admission
//! - [`comms`]: top-level wiring of listeners, client channels and shutdown

pub mod channel;
pub mod comms;
pub mod error;
pub mod manager;
pub mod policy;
pub mod protocol;
pub mod routing;
pub mod test_utils;
pub mod transports;

pub use channel::{
    Attachment, ChannelEvent, ChannelEventListener, ChannelEventType, ChannelLifecycle,
    ClientMessageChannel, MessageChannel, ServerMessageChannel,
};
pub use comms::{CommunicationsManager, ConnectionIdFactory, NetworkListener};
pub use error::{
    ChannelError, CommsError, Direction, FactoryError, Result, RouteError, TransportError,
};
pub use manager::{
    ChannelManager, ChannelManagerEventListener, DefaultServerChannelFactory, ServerChannelFactory,
};
pub use policy::ConnectionPolicy;
pub use protocol::{
    register_builtin_messages, BoxedMessage, MessageEnvelope, MessageFactory, MessageMapping,
    MessageMonitor, MessageParser, MessageStatsMonitor, NullMessageMonitor, PingMessage,
    PongMessage, TcMessage, WireMessage,
};
pub use routing::{
    start_hydrate_stage, EventHandler, HydrateContext, MessageRouter, MessageSink, Sink,
    SourceKeyed, Stage, UnsupportedMessageSink,
};
pub use transports::{
    MemoryNetworkLayer, NetworkLayer, ReceiveLayer, TcpNetworkConfig, TcpNetworkLayer,
};

