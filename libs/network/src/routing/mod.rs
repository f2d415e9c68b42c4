//! Message Routing
//!
//! Received messages leave the channel through the [`MessageRouter`]:
//!
//! ```text
//! channel.receive ─▶ parser ─▶ router.put_message ─┬─▶ destination sink
//!                                                  ├─▶ hydrate stage ─▶ destination sink
//!                                                  └─▶ UnsupportedMessageSink (error)
//! ```
//!
//! A [`Stage`] is a keyed tokio worker pool. Items with the same source key
//! always land on the same worker, so per-channel order holds within one stage.

pub mod hydrate;
pub mod router;
pub mod sink;
pub mod stage;

pub use hydrate::{start_hydrate_stage, HydrateContext, HydrateHandler, HYDRATE_STAGE};
pub use router::MessageRouter;
pub use sink::{MessageSink, Sink, UnsupportedMessageSink};
pub use stage::{EventHandler, SourceKeyed, Stage};
