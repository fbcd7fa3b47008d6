//! Recording card service for scenario tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use cardwire_core::card::{
    CardInstanceId, CreateOptions, PrivateDataPatch, StreamingUpdate, UpdateOptions, UserProfile,
};
use cardwire_core::error::CardError;
use cardwire_core::event::{CardCallback, EventEnvelope, TOPIC_CARD_CALLBACK, TOPIC_ROBOT};
use cardwire_core::message::{IncomingMessage, TextContent};
use cardwire_core::params::CardParamMap;
use cardwire_core::service::CardService;
use serde_json::{Value, json};
use tokio::sync::Notify;

#[derive(Debug, Clone)]
pub struct CreatedCard {
    pub instance_id: CardInstanceId,
    pub template_id: String,
    pub public_data: CardParamMap,
    pub target: IncomingMessage,
    pub options: CreateOptions,
}

#[derive(Debug, Clone)]
pub struct UpdatedCard {
    pub instance_id: CardInstanceId,
    pub public_patch: Option<CardParamMap>,
    pub private_patch: Option<PrivateDataPatch>,
}

/// Hands out `card-1`, `card-2`, ... and remembers every call.
#[derive(Default)]
pub struct RecordingCardService {
    pub created: Mutex<Vec<CreatedCard>>,
    pub updates: Mutex<Vec<UpdatedCard>>,
    pub profiles: Mutex<HashMap<String, UserProfile>>,
    pub streamed: Mutex<Vec<(CardInstanceId, StreamingUpdate)>>,
    /// Users whose profile lookup never returns.
    pub hung_profiles: Mutex<HashSet<String>>,
    /// Instances whose updates never return.
    pub hung_updates: Mutex<HashSet<CardInstanceId>>,
    /// Signalled whenever a call starts hanging.
    pub hung: Notify,
    /// Streaming updates with this key fail.
    pub failing_stream_key: Mutex<Option<String>>,
}

impl RecordingCardService {
    pub fn with_profile(self, user_id: &str, name: &str, avatar: &str) -> Self {
        self.profiles.lock().unwrap().insert(
            user_id.to_string(),
            UserProfile {
                name: name.into(),
                avatar: avatar.into(),
            },
        );
        self
    }

    pub fn with_hung_profile(self, user_id: &str) -> Self {
        self.hung_profiles.lock().unwrap().insert(user_id.to_string());
        self
    }

    pub fn with_hung_update(self, instance_id: &str) -> Self {
        self.hung_updates.lock().unwrap().insert(instance_id.into());
        self
    }

    pub fn with_failing_stream(self, key: &str) -> Self {
        *self.failing_stream_key.lock().unwrap() = Some(key.to_string());
        self
    }

    pub fn streamed(&self) -> Vec<(CardInstanceId, StreamingUpdate)> {
        self.streamed.lock().unwrap().clone()
    }

    async fn hang(&self) {
        self.hung.notify_one();
        std::future::pending::<()>().await;
    }

    pub fn created(&self) -> Vec<CreatedCard> {
        self.created.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<UpdatedCard> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl CardService for RecordingCardService {
    async fn create_and_deliver(
        &self,
        template_id: &str,
        public_data: CardParamMap,
        target: &IncomingMessage,
        options: CreateOptions,
    ) -> Result<CardInstanceId, CardError> {
        let mut created = self.created.lock().unwrap();
        let instance_id = CardInstanceId(format!("card-{}", created.len() + 1));
        created.push(CreatedCard {
            instance_id: instance_id.clone(),
            template_id: template_id.to_string(),
            public_data,
            target: target.clone(),
            options,
        });
        Ok(instance_id)
    }

    async fn update(
        &self,
        instance_id: &CardInstanceId,
        public_patch: Option<CardParamMap>,
        private_patch: Option<PrivateDataPatch>,
        _options: UpdateOptions,
    ) -> Result<(), CardError> {
        if self.hung_updates.lock().unwrap().contains(instance_id) {
            self.hang().await;
        }
        self.updates.lock().unwrap().push(UpdatedCard {
            instance_id: instance_id.clone(),
            public_patch,
            private_patch,
        });
        Ok(())
    }

    async fn stream_update(
        &self,
        instance_id: &CardInstanceId,
        update: StreamingUpdate,
    ) -> Result<(), CardError> {
        let failing = self.failing_stream_key.lock().unwrap().clone();
        let fails = failing.as_deref() == Some(update.key.as_str()) && !update.is_error;
        self.streamed
            .lock()
            .unwrap()
            .push((instance_id.clone(), update));
        if fails {
            return Err(CardError::Status {
                operation: "stream_update",
                status: 500,
                body: "streaming rejected".into(),
            });
        }
        Ok(())
    }

    async fn user_profile(&self, user_id: &str) -> Result<UserProfile, CardError> {
        if self.hung_profiles.lock().unwrap().contains(user_id) {
            self.hang().await;
        }
        self.profiles
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .ok_or_else(|| CardError::Rejected {
                operation: "user_profile",
                body: format!("no such user {user_id}"),
            })
    }
}

pub fn group_message(text: &str) -> IncomingMessage {
    IncomingMessage {
        conversation_id: "cid-group".into(),
        conversation_type: "2".into(),
        sender_id: "sender".into(),
        sender_corp_id: "corp".into(),
        sender_staff_id: "staff1".into(),
        sender_nick: "Alice".into(),
        msg_id: "msg1".into(),
        text: Some(TextContent {
            content: text.into(),
        }),
        ..IncomingMessage::default()
    }
}

pub fn robot_event(text: &str) -> EventEnvelope {
    EventEnvelope::new(TOPIC_ROBOT, "robot-1", &group_message(text)).unwrap()
}

/// A card callback whose content carries `params` and `action_ids`.
pub fn callback_event(
    instance_id: &str,
    user_id: &str,
    action_ids: &[&str],
    params: Value,
) -> EventEnvelope {
    let content = json!({
        "cardPrivateData": { "actionIds": action_ids, "params": params }
    });
    let callback = CardCallback {
        out_track_id: instance_id.into(),
        user_id: user_id.into(),
        content: content.to_string(),
        ..CardCallback::default()
    };
    EventEnvelope::new(TOPIC_CARD_CALLBACK, "callback-1", &callback).unwrap()
}

/// The `cardParamMap` of the private or public part of a callback reply.
pub fn reply_params(payload: &cardwire_core::event::AckPayload, part: &str) -> Value {
    match payload {
        cardwire_core::event::AckPayload::Response(body) => body[part]["cardParamMap"].clone(),
        other => panic!("expected a response ack, got {other:?}"),
    }
}
