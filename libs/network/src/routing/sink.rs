//! Sinks

use tracing::error;

use crate::error::RouteError;
use crate::protocol::BoxedMessage;

/// Synchronous hand-off point for routed items
pub trait Sink<T>: Send + Sync {
    fn put(&self, item: T) -> Result<(), RouteError>;
}

/// Destination for typed messages
pub type MessageSink = dyn Sink<BoxedMessage>;

/// Default route. A valid message with no consumer is a configuration error,
/// never a silent drop.
#[derive(Debug, Default)]
pub struct UnsupportedMessageSink;

impl Sink<BoxedMessage> for UnsupportedMessageSink {
    fn put(&self, message: BoxedMessage) -> Result<(), RouteError> {
        let err = RouteError::UnsupportedMessageType {
            message_type: message.message_type(),
            channel: message.channel_id(),
        };
        error!(error = %err, "No route for received message");
        Err(err)
    }
}
