//! # Channel Messaging Codec
//!
//! ## Purpose
//!
//! The "rules" layer between raw bytes and typed messages:
//! - wire header build/view/validate/frame ([`header`])
//! - frame decoding up to type resolution ([`parser`])
//! - body builder and reader ([`buffers`])
//! - protocol error types ([`error`])
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → [codec] → libs/network
//!     ↑           ↓            ↓
//! Header      Framing      Channels,
//! Layout      Validation   Factory, Router
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Transport or channel logic (belongs in network/)
//! - Typed message construction (the network crate's message factory)

pub mod buffers;
pub mod error;
pub mod header;
pub mod parser;

pub use buffers::{BodyBuilder, BodyReader};
pub use error::{ProtocolError, ProtocolResult};
pub use header::{build_for_send, encode_frame, validate, wrap_for_receive};
pub use parser::{decode_frame, WireFrame};
