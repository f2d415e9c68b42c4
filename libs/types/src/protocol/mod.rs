//! Protocol layer: wire constants, the message type table and the header layout.

pub mod constants;
pub mod message;
pub mod message_type;

pub use constants::*;
pub use message::MessageHeader;
pub use message_type::{validate_records, MessageType, MessageTypeRecord, MessageTypeRegistry};
