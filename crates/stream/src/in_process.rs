//! In-process event source.
//!
//! Events are injected by the host (the HTTP ingress, tests) instead of
//! arriving over the platform's websocket. Acks are recorded so callers can
//! observe them.

use std::time::Duration;

use async_trait::async_trait;
use cardwire_core::error::EventError;
use cardwire_core::event::{Ack, EventEnvelope};
use cardwire_core::source::EventSource;
use tokio::sync::{Mutex, Notify, mpsc};
use tracing::{debug, info};

pub struct InProcessSource {
    buffer: usize,
    inject_tx: Mutex<Option<mpsc::Sender<EventEnvelope>>>,
    acks: Mutex<Vec<Ack>>,
    ack_notify: Notify,
}

impl Default for InProcessSource {
    fn default() -> Self {
        Self::new(64)
    }
}

impl InProcessSource {
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            inject_tx: Mutex::new(None),
            acks: Mutex::new(Vec::new()),
            ack_notify: Notify::new(),
        }
    }

    /// Inject an event as if it came from the stream.
    pub async fn inject(&self, event: EventEnvelope) -> Result<(), EventError> {
        let guard = self.inject_tx.lock().await;
        match guard.as_ref() {
            Some(tx) => tx
                .send(event)
                .await
                .map_err(|_| EventError::Disconnected("event receiver dropped".into())),
            None => Err(EventError::Disconnected("source not started".into())),
        }
    }

    /// Acks delivered so far, in delivery order.
    pub async fn acks(&self) -> Vec<Ack> {
        self.acks.lock().await.clone()
    }

    /// Wait until at least `count` acks were delivered, or `timeout` passes.
    /// Returns whatever was recorded by then.
    pub async fn wait_for_acks(&self, count: usize, timeout: Duration) -> Vec<Ack> {
        let wait = async {
            loop {
                {
                    let acks = self.acks.lock().await;
                    if acks.len() >= count {
                        return;
                    }
                }
                self.ack_notify.notified().await;
            }
        };
        let _ = tokio::time::timeout(timeout, wait).await;
        self.acks().await
    }
}

#[async_trait]
impl EventSource for InProcessSource {
    fn name(&self) -> &str {
        "in_process"
    }

    async fn start(&self) -> Result<mpsc::Receiver<EventEnvelope>, EventError> {
        info!("In-process event source starting");
        let (tx, rx) = mpsc::channel(self.buffer);
        *self.inject_tx.lock().await = Some(tx);
        Ok(rx)
    }

    async fn ack(&self, ack: Ack) -> Result<(), EventError> {
        debug!(message_id = %ack.message_id, payload = ?ack.payload, "Ack recorded");
        self.acks.lock().await.push(ack);
        self.ack_notify.notify_one();
        Ok(())
    }

    async fn stop(&self) -> Result<(), EventError> {
        info!("In-process event source stopping");
        *self.inject_tx.lock().await = None;
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, EventError> {
        Ok(self.inject_tx.lock().await.is_some())
    }
}
