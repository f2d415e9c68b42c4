//! # Message Header
//!
//! Fixed 8-byte prefix carried by every message:
//!
//! ```text
//! ┌─────────┬────────────┬───────────────┬───────────────┬──────────┐
//! │ version │ header len │ type code     │ type version  │ reserved │
//! │ (1)     │ (1, words) │ (2, BE u16)   │ (2, BE u16)   │ (2)      │
//! └─────────┴────────────┴───────────────┴───────────────┴──────────┘
//! ```
//!
//! The body follows immediately after the header. Encoding, validation and
//! framing live in the `codec` crate; this module only owns the layout.

pub mod header;

pub use header::*;
