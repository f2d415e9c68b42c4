//! Message Router
//!
//! Message type → route. A direct route delivers the message as parsed, with
//! its body still undecoded; a hydrated route sends it through the hydration
//! stage first. Anything unrouted goes to the [`UnsupportedMessageSink`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};
use types::MessageType;

use super::hydrate::HydrateContext;
use super::sink::{MessageSink, Sink, UnsupportedMessageSink};
use crate::error::RouteError;
use crate::protocol::BoxedMessage;

#[derive(Clone)]
enum Route {
    Direct(Arc<MessageSink>),
    Hydrated {
        destination: Arc<MessageSink>,
        hydration: Arc<dyn Sink<HydrateContext>>,
    },
}

pub struct MessageRouter {
    routes: RwLock<HashMap<MessageType, Route>>,
    default_route: Arc<MessageSink>,
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            default_route: Arc::new(UnsupportedMessageSink),
        }
    }
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `message_type` straight to `sink`. Replaces any existing route.
    pub fn route_message_type(&self, message_type: MessageType, sink: Arc<MessageSink>) {
        self.install(message_type, Route::Direct(sink));
    }

    /// Hydrate `message_type` on `hydration` before delivering to `destination`.
    pub fn route_message_type_with_hydration(
        &self,
        message_type: MessageType,
        destination: Arc<MessageSink>,
        hydration: Arc<dyn Sink<HydrateContext>>,
    ) {
        self.install(
            message_type,
            Route::Hydrated {
                destination,
                hydration,
            },
        );
    }

    fn install(&self, message_type: MessageType, route: Route) {
        if self.routes.write().insert(message_type, route).is_some() {
            info!(%message_type, "Replaced message route");
        } else {
            debug!(%message_type, "Routed message type");
        }
    }

    /// Returns `true` if a route was removed.
    pub fn unroute_message_type(&self, message_type: MessageType) -> bool {
        self.routes.write().remove(&message_type).is_some()
    }

    pub fn is_routed(&self, message_type: MessageType) -> bool {
        self.routes.read().contains_key(&message_type)
    }

    pub fn routed_types(&self) -> Vec<MessageType> {
        let mut types: Vec<_> = self.routes.read().keys().copied().collect();
        types.sort();
        types
    }

    /// Dispatch one received message.
    pub fn put_message(&self, message: BoxedMessage) -> Result<(), RouteError> {
        let route = self.routes.read().get(&message.message_type()).cloned();
        match route {
            Some(Route::Direct(sink)) => sink.put(message),
            Some(Route::Hydrated {
                destination,
                hydration,
            }) => hydration.put(HydrateContext::new(message, destination)),
            None => self.default_route.put(message),
        }
    }
}

impl Sink<BoxedMessage> for MessageRouter {
    fn put(&self, message: BoxedMessage) -> Result<(), RouteError> {
        self.put_message(message)
    }
}

impl fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageRouter")
            .field("routed_types", &self.routed_types())
            .finish()
    }
}
