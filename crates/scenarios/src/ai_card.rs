//! AI reply card: deliver an empty card, then stream the reply into it.
//!
//! The reply here echoes the message text. Content grows in full
//! replacements of the `content` variable, then a finalizing update closes
//! the stream. If streaming breaks off, the card is marked failed with the
//! last content that made it through.

use std::sync::Arc;

use async_trait::async_trait;
use cardwire_core::card::{CardInstanceId, CreateOptions, StreamingUpdate};
use cardwire_core::error::{CardError, Result};
use cardwire_core::event::{AckPayload, EventEnvelope, EventHandler};
use cardwire_core::message::IncomingMessage;
use cardwire_core::params::to_param_map_from;
use cardwire_core::service::CardService;
use serde_json::json;
use tracing::{debug, info, warn};

pub const TEMPLATE_ID: &str = "d70f026e-7148-4479-b089-8dcf60289b9d.schema";
pub const CONTENT_KEY: &str = "content";
/// Characters of new content that trigger a streaming update.
pub const CHUNK_CHARS: usize = 20;

/// Growing prefixes of `text`, each at least `step` characters longer than
/// the previous one. The last prefix is always the whole text.
pub fn cumulative_chunks(text: &str, step: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = step.max(1);
    let mut chunks: Vec<String> = (1..=chars.len().div_ceil(step))
        .map(|n| chars[..(n * step).min(chars.len())].iter().collect())
        .collect();
    if chunks.is_empty() {
        chunks.push(String::new());
    }
    chunks
}

pub struct AiCardBot {
    cards: Arc<dyn CardService>,
    chunk_chars: usize,
}

impl AiCardBot {
    pub fn new(cards: Arc<dyn CardService>) -> Self {
        Self {
            cards,
            chunk_chars: CHUNK_CHARS,
        }
    }

    pub fn with_chunk_chars(mut self, chunk_chars: usize) -> Self {
        self.chunk_chars = chunk_chars;
        self
    }

    /// Stream every chunk, then finalize. On failure, returns the error
    /// together with the last content the card accepted.
    async fn stream_reply(
        &self,
        id: &CardInstanceId,
        reply: &str,
    ) -> std::result::Result<(), (CardError, String)> {
        let mut shown = String::new();
        for chunk in cumulative_chunks(reply, self.chunk_chars) {
            self.cards
                .stream_update(id, StreamingUpdate::full(CONTENT_KEY, chunk.clone()))
                .await
                .map_err(|e| (e, shown.clone()))?;
            debug!(instance_id = %id, chars = chunk.chars().count(), "Streamed reply chunk");
            shown = chunk;
        }
        self.cards
            .stream_update(id, StreamingUpdate::full(CONTENT_KEY, shown.clone()).finalize())
            .await
            .map_err(|e| (e, shown))
    }
}

#[async_trait]
impl EventHandler for AiCardBot {
    async fn handle(&self, event: &EventEnvelope) -> Result<AckPayload> {
        let msg: IncomingMessage = event.decode()?;
        let reply = msg.text().trim().to_string();

        let data = json!({ "content": "", "config": { "autoLayout": true } });
        let instance_id = self
            .cards
            .create_and_deliver(TEMPLATE_ID, to_param_map_from(&data)?, &msg, CreateOptions::default())
            .await?;

        match self.stream_reply(&instance_id, &reply).await {
            Ok(()) => {
                info!(instance_id = %instance_id, chars = reply.chars().count(), "AI card reply finished");
            }
            Err((e, shown)) => {
                warn!(instance_id = %instance_id, error = %e, "AI card streaming failed");
                let failed = StreamingUpdate::full(CONTENT_KEY, shown).failed();
                if let Err(e) = self.cards.stream_update(&instance_id, failed).await {
                    warn!(instance_id = %instance_id, error = %e, "Could not mark AI card failed");
                }
            }
        }
        // The card exists either way; redelivery would only post another one.
        Ok(AckPayload::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingCardService, robot_event};

    #[test]
    fn chunks_grow_to_full_text() {
        assert_eq!(cumulative_chunks("abcdefg", 3), vec!["abc", "abcdef", "abcdefg"]);
        assert_eq!(cumulative_chunks("abcdef", 3), vec!["abc", "abcdef"]);
        assert_eq!(cumulative_chunks("", 3), vec![""]);
    }

    #[test]
    fn chunks_split_on_characters_not_bytes() {
        assert_eq!(cumulative_chunks("你好世界", 2), vec!["你好", "你好世界"]);
    }

    #[tokio::test]
    async fn streams_reply_then_finalizes() {
        let cards = Arc::new(RecordingCardService::default());
        let bot = AiCardBot::new(cards.clone()).with_chunk_chars(4);

        let ack = bot.handle(&robot_event("  hello world  ")).await.unwrap();
        assert_eq!(ack, AckPayload::Success);

        let created = &cards.created()[0];
        assert_eq!(created.template_id, TEMPLATE_ID);
        assert_eq!(created.public_data[CONTENT_KEY], "");
        assert_eq!(created.public_data["config"], r#"{"autoLayout":true}"#);

        let streamed = cards.streamed();
        let contents: Vec<&str> = streamed.iter().map(|(_, u)| u.content.as_str()).collect();
        assert_eq!(contents, vec!["hell", "hello wo", "hello world", "hello world"]);
        assert!(streamed.iter().all(|(id, u)| *id == created.instance_id && u.key == CONTENT_KEY && u.is_full));

        let (last, earlier) = streamed.split_last().unwrap();
        assert!(last.1.is_finalize);
        assert!(!last.1.is_error);
        assert!(earlier.iter().all(|(_, u)| !u.is_finalize && !u.is_error));
    }

    #[tokio::test]
    async fn failed_stream_marks_card_failed() {
        let cards = Arc::new(RecordingCardService::default().with_failing_stream(CONTENT_KEY));
        let bot = AiCardBot::new(cards.clone());

        let ack = bot.handle(&robot_event("hello")).await.unwrap();
        assert_eq!(ack, AckPayload::Success);

        let streamed = cards.streamed();
        assert_eq!(streamed.len(), 2);
        let (_, failed) = &streamed[1];
        assert!(failed.is_error);
        assert!(!failed.is_finalize);
        assert_eq!(failed.content, "");
    }
}
