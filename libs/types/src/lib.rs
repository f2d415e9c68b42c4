//! # Channel Messaging Types
//!
//! Shared type definitions for the channel messaging layer.
//!
//! ## Design Philosophy
//!
//! - **Closed Type Set**: every wire message type is a variant of [`MessageType`];
//!   codes are never reused and the table is validated once at startup
//! - **Typed Identifiers**: channel, session and connection ids are distinct
//!   newtypes so they cannot be swapped at call sites
//! - **Zero-Copy Header**: [`MessageHeader`] is a `zerocopy` struct viewed
//!   directly over received bytes
//!
//! ## Quick Start
//!
//! ```rust
//! use types::{MessageType, MessageTypeRegistry, ChannelId};
//!
//! let registry = MessageTypeRegistry::global().expect("message type table is valid");
//! assert_eq!(registry.lookup(1), Some(MessageType::Ping));
//! assert_eq!(MessageType::Ping.name(), "PING_MESSAGE");
//!
//! let channel = ChannelId::new(7);
//! assert!(!channel.is_null());
//! ```

pub mod common;
pub mod protocol;

pub use common::errors::RegistryError;
pub use common::identifiers::{ChannelId, ConnectionId, SessionId};
pub use protocol::constants::{HEADER_LENGTH, HEADER_WORDS, MAX_HEADER_WORDS, PROTOCOL_VERSION};
pub use protocol::message::MessageHeader;
pub use protocol::message_type::{MessageType, MessageTypeRecord, MessageTypeRegistry};
