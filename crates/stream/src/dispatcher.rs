//! Topic dispatcher: one handler per topic, one ack per event.

use std::collections::HashMap;
use std::sync::Arc;

use cardwire_core::event::{Ack, AckPayload, EventEnvelope, EventHandler};
use tracing::{debug, error, info, warn};

/// Routes events to the handler registered for their topic.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `topic`, replacing any previous one.
    pub fn register(&mut self, topic: impl Into<String>, handler: Arc<dyn EventHandler>) {
        let topic = topic.into();
        info!(topic = %topic, "Registered event handler");
        self.handlers.insert(topic, handler);
    }

    pub fn has_handler(&self, topic: &str) -> bool {
        self.handlers.contains_key(topic)
    }

    /// All topics with a handler, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.handlers.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Handle `event` and produce its acknowledgement.
    ///
    /// Never fails: a handler error or panic acks `Later` so the upstream can
    /// redeliver, and an event for a topic nobody handles acks `Success` so it
    /// is not redelivered forever.
    pub async fn dispatch(&self, event: &EventEnvelope) -> Ack {
        let message_id = event.message_id().to_string();
        let topic = event.topic();

        let Some(handler) = self.handlers.get(topic).cloned() else {
            warn!(topic, message_id = %message_id, "No handler for topic");
            return Ack::new(message_id, AckPayload::Success);
        };

        debug!(topic, message_id = %message_id, "Dispatching event");

        // A separate task so a panicking handler still gets its event acked.
        let owned = event.clone();
        let outcome = tokio::spawn(async move { handler.handle(&owned).await }).await;

        let payload = match outcome {
            Ok(Ok(payload)) => payload,
            Ok(Err(e)) => {
                warn!(topic, message_id = %message_id, error = %e, "Handler failed");
                AckPayload::Later
            }
            Err(e) => {
                error!(topic, message_id = %message_id, error = %e, "Handler panicked");
                AckPayload::Later
            }
        };
        Ack::new(message_id, payload)
    }
}
