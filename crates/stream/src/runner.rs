//! Pulls events from a source and dispatches each on its own task.

use std::sync::Arc;

use cardwire_core::error::EventError;
use cardwire_core::source::EventSource;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::dispatcher::EventDispatcher;

pub struct StreamRunner {
    source: Arc<dyn EventSource>,
    dispatcher: Arc<EventDispatcher>,
}

impl StreamRunner {
    pub fn new(source: Arc<dyn EventSource>, dispatcher: Arc<EventDispatcher>) -> Self {
        Self { source, dispatcher }
    }

    /// Run until the source's stream ends.
    ///
    /// Each event gets its own task, so a slow remote call holds up only the
    /// event that made it. The task sends exactly one ack.
    pub async fn run(&self) -> Result<(), EventError> {
        let mut rx = self.source.start().await?;
        info!(source = self.source.name(), topics = ?self.dispatcher.topics(), "Stream runner started");

        while let Some(event) = rx.recv().await {
            let source = self.source.clone();
            let dispatcher = self.dispatcher.clone();
            tokio::spawn(async move {
                let ack = dispatcher.dispatch(&event).await;
                let message_id = ack.message_id.clone();
                if let Err(e) = source.ack(ack).await {
                    warn!(message_id = %message_id, error = %e, "Failed to deliver ack");
                }
            });
        }

        info!(source = self.source.name(), "Event stream ended");
        Ok(())
    }

    /// Run on a background task.
    pub fn spawn(self) -> JoinHandle<Result<(), EventError>> {
        tokio::spawn(async move { self.run().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_process::InProcessSource;
    use async_trait::async_trait;
    use cardwire_core::error::Result;
    use cardwire_core::event::{AckPayload, EventEnvelope, EventHandler};
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Blocks until released.
    struct Gate(Arc<Notify>);

    #[async_trait]
    impl EventHandler for Gate {
        async fn handle(&self, _event: &EventEnvelope) -> Result<AckPayload> {
            self.0.notified().await;
            Ok(AckPayload::Success)
        }
    }

    struct Echo;

    #[async_trait]
    impl EventHandler for Echo {
        async fn handle(&self, event: &EventEnvelope) -> Result<AckPayload> {
            Ok(AckPayload::Response(json!({ "echo": event.message_id() })))
        }
    }

    fn event(topic: &str, id: &str) -> EventEnvelope {
        EventEnvelope::new(topic, id, &json!({})).unwrap()
    }

    async fn started(dispatcher: EventDispatcher) -> (Arc<InProcessSource>, JoinHandle<std::result::Result<(), EventError>>) {
        let source = Arc::new(InProcessSource::default());
        let handle = StreamRunner::new(source.clone(), Arc::new(dispatcher)).spawn();
        // Wait for the runner to install its receiver.
        while !source.health_check().await.unwrap() {
            tokio::task::yield_now().await;
        }
        (source, handle)
    }

    #[tokio::test]
    async fn every_event_is_acked_once() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register("/echo", Arc::new(Echo));
        let (source, _runner) = started(dispatcher).await;

        source.inject(event("/echo", "m1")).await.unwrap();
        source.inject(event("/unknown", "m2")).await.unwrap();

        let acks = source.wait_for_acks(2, Duration::from_secs(5)).await;
        assert_eq!(acks.len(), 2);
        let echo = acks.iter().find(|a| a.message_id == "m1").unwrap();
        assert_eq!(echo.payload, AckPayload::Response(json!({ "echo": "m1" })));
        let unknown = acks.iter().find(|a| a.message_id == "m2").unwrap();
        assert_eq!(unknown.payload, AckPayload::Success);
    }

    #[tokio::test]
    async fn slow_event_does_not_block_others() {
        let gate = Arc::new(Notify::new());
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register("/slow", Arc::new(Gate(gate.clone())));
        dispatcher.register("/fast", Arc::new(Echo));
        let (source, _runner) = started(dispatcher).await;

        source.inject(event("/slow", "slow")).await.unwrap();
        source.inject(event("/fast", "fast")).await.unwrap();

        let acks = source.wait_for_acks(1, Duration::from_secs(5)).await;
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].message_id, "fast");

        gate.notify_one();
        let acks = source.wait_for_acks(2, Duration::from_secs(5)).await;
        assert_eq!(acks.len(), 2);
        assert_eq!(acks[1].message_id, "slow");
    }

    #[tokio::test]
    async fn runner_ends_when_source_stops() {
        let (source, runner) = started(EventDispatcher::new()).await;
        source.stop().await.unwrap();
        assert!(runner.await.unwrap().is_ok());
    }
}
