//! Inbound stream events and their acknowledgements.
//!
//! Every event carries a message id in its headers and a JSON-encoded body
//! whose shape depends on the topic. Each event must be acknowledged exactly
//! once; an event without an ack is treated as unhandled upstream and
//! redelivered.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::card::CardInstanceId;
use crate::error::{EventError, Result};

/// Robot messages (someone talked to the bot).
pub const TOPIC_ROBOT: &str = "/v1.0/im/bot/messages/get";
/// Card interactions (button clicks, form input).
pub const TOPIC_CARD_CALLBACK: &str = "/v1.0/card/instances/callback";
/// Dynamic data source pulls.
pub const TOPIC_DYNAMIC_DATA: &str = "/v1.0/card/dynamicData/get";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHeaders {
    pub message_id: String,
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

/// One event as delivered by the stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub headers: EventHeaders,
    /// JSON text; decode with [`EventEnvelope::decode`].
    #[serde(default)]
    pub data: String,
}

impl EventEnvelope {
    pub fn new(topic: &str, message_id: impl Into<String>, data: &impl Serialize) -> Result<Self> {
        Ok(Self {
            kind: Some("CALLBACK".into()),
            headers: EventHeaders {
                message_id: message_id.into(),
                topic: topic.to_string(),
                content_type: Some("application/json".into()),
                time: None,
            },
            data: serde_json::to_string(data)?,
        })
    }

    pub fn message_id(&self) -> &str {
        &self.headers.message_id
    }

    pub fn topic(&self) -> &str {
        &self.headers.topic
    }

    /// Decode the body into the topic's payload type.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.data).map_err(|e| {
            EventError::MalformedBody {
                topic: self.headers.topic.clone(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

/// What a handler answers with.
#[derive(Debug, Clone, PartialEq)]
pub enum AckPayload {
    /// Processed, nothing to say.
    Success,
    /// Not processed now; the upstream may redeliver.
    Later,
    /// Processed, with a reply body (card callback replies, dynamic data).
    Response(Value),
}

impl AckPayload {
    pub fn response(body: &impl Serialize) -> Result<Self> {
        Ok(Self::Response(serde_json::to_value(body)?))
    }
}

/// The single acknowledgement sent for one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Ack {
    pub message_id: String,
    pub payload: AckPayload,
}

impl Ack {
    pub fn new(message_id: impl Into<String>, payload: AckPayload) -> Self {
        Self {
            message_id: message_id.into(),
            payload,
        }
    }

    /// The stream's acknowledgement frame.
    pub fn to_frame(&self) -> Value {
        let data = match &self.payload {
            AckPayload::Success => json!({ "status": "SUCCESS" }),
            AckPayload::Later => json!({ "status": "LATER" }),
            AckPayload::Response(body) => json!({ "response": body }),
        };
        json!({
            "code": 200,
            "headers": {
                "contentType": "application/json",
                "messageId": self.message_id,
            },
            "message": "OK",
            "data": data.to_string(),
        })
    }
}

impl Serialize for Ack {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_frame().serialize(serializer)
    }
}

/// A handler for one topic.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &EventEnvelope) -> Result<AckPayload>;
}

// --- Topic payloads ---

/// Body of a card callback event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardCallback {
    pub out_track_id: CardInstanceId,
    #[serde(default)]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corp_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_type: Option<String>,
    /// JSON text holding `cardPrivateData`.
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackContent {
    #[serde(default)]
    pub card_private_data: CardPrivateData,
}

/// The interaction itself: which action fired and with what parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPrivateData {
    #[serde(default)]
    pub action_ids: Vec<String>,
    #[serde(default)]
    pub params: serde_json::Map<String, Value>,
}

impl CardPrivateData {
    pub fn first_action_id(&self) -> Option<&str> {
        self.action_ids.first().map(String::as_str)
    }
}

impl CardCallback {
    pub fn private_data(&self) -> Result<CardPrivateData> {
        if self.content.trim().is_empty() {
            return Ok(CardPrivateData::default());
        }
        let content: CallbackContent =
            serde_json::from_str(&self.content).map_err(|e| EventError::MalformedBody {
                topic: TOPIC_CARD_CALLBACK.into(),
                reason: format!("content: {e}"),
            })?;
        Ok(content.card_private_data)
    }
}

/// Body of a dynamic data source pull.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicDataQuery {
    pub out_track_id: CardInstanceId,
    #[serde(default)]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corp_id: Option<String>,
}
