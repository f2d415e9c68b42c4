//! Typed Messages
//!
//! Everything between a validated [`codec::WireFrame`] and a typed message:
//!
//! - [`message`]: the envelope every message carries and the [`TcMessage`] trait
//! - [`factory`]: explicit per-type construction strategies (outbound, inbound)
//! - [`parser`]: receive segments → typed message, via the factory
//! - [`monitor`]: construction and byte counters
//! - [`messages`]: built-in PING/PONG

pub mod factory;
pub mod message;
pub mod messages;
pub mod monitor;
pub mod parser;

pub use factory::{MessageBuilderFn, MessageFactory, MessageMapping};
pub use message::{BoxedMessage, MessageEnvelope, TcMessage, WireMessage};
pub use messages::{register_builtin_messages, PingMessage, PongMessage};
pub use monitor::{MessageMonitor, MessageStats, MessageStatsMonitor, NullMessageMonitor};
pub use parser::MessageParser;
