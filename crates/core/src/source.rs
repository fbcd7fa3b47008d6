//! EventSource trait: the abstraction over the inbound event stream.
//!
//! A source yields [`EventEnvelope`]s and accepts the [`Ack`] for each one.
//! The platform's websocket client is one possible source; the HTTP ingress
//! and the in-process source used in tests are others.

use async_trait::async_trait;
use tokio::sync::mpsc::Receiver;

use crate::error::EventError;
use crate::event::{Ack, EventEnvelope};

#[async_trait]
pub trait EventSource: Send + Sync {
    /// Human-readable source name (e.g., "in_process", "http").
    fn name(&self) -> &str;

    /// Start receiving events.
    async fn start(&self) -> Result<Receiver<EventEnvelope>, EventError>;

    /// Deliver the acknowledgement for one event.
    async fn ack(&self, ack: Ack) -> Result<(), EventError>;

    /// Stop the source gracefully.
    async fn stop(&self) -> Result<(), EventError> {
        Ok(())
    }

    /// Whether the source is connected.
    async fn health_check(&self) -> Result<bool, EventError> {
        Ok(true)
    }
}
