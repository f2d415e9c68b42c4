//! Hydration Stage
//!
//! Body decoding moved off the network reader. A message routed with
//! hydration travels as a [`HydrateContext`] to a [`Stage`] worker, which
//! decodes the body and forwards the message to its real destination. A body
//! that fails to decode closes the owning channel and is never forwarded.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use super::sink::MessageSink;
use super::stage::{EventHandler, SourceKeyed, Stage};
use crate::protocol::BoxedMessage;

pub const HYDRATE_STAGE: &str = "hydrate_stage";

/// A message awaiting decode, and where to deliver it afterwards
pub struct HydrateContext {
    pub message: BoxedMessage,
    pub destination: Arc<MessageSink>,
}

impl HydrateContext {
    pub fn new(message: BoxedMessage, destination: Arc<MessageSink>) -> Self {
        Self {
            message,
            destination,
        }
    }
}

impl fmt::Debug for HydrateContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HydrateContext")
            .field("message", &self.message)
            .finish()
    }
}

impl SourceKeyed for HydrateContext {
    fn source_key(&self) -> u64 {
        self.message.channel_id().inner()
    }
}

#[derive(Debug, Default)]
pub struct HydrateHandler;

impl HydrateHandler {
    /// Decode and forward one message.
    pub fn hydrate(&self, context: HydrateContext) {
        let HydrateContext {
            mut message,
            destination,
        } = context;
        let channel = message.channel().clone();
        let message_type = message.message_type();

        match message.hydrate() {
            Ok(()) => {
                debug!(channel = %channel.channel_id(), %message_type, "Hydrated message");
                if let Err(e) = destination.put(message) {
                    error!(channel = %channel.channel_id(), %message_type, error = %e, "Failed to deliver hydrated message");
                }
            }
            Err(e) => {
                error!(
                    channel = %channel.channel_id(),
                    %message_type,
                    error = %e,
                    "Failed to hydrate message, closing channel"
                );
                channel.close();
            }
        }
    }
}

#[async_trait]
impl EventHandler<HydrateContext> for HydrateHandler {
    async fn handle_event(&self, context: HydrateContext) {
        self.hydrate(context);
    }
}

/// Start the shared hydration stage on the current runtime.
pub fn start_hydrate_stage(workers: usize) -> Arc<Stage<HydrateContext>> {
    Stage::start(HYDRATE_STAGE, workers, Arc::new(HydrateHandler))
}
