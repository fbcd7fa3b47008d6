//! Group relay: members join a shared list on the card, or withdraw.

use std::sync::Arc;

use async_trait::async_trait;
use cardwire_core::card::{CardInstanceId, CreateOptions, PrivateDataPatch, UpdateOptions};
use cardwire_core::error::Result;
use cardwire_core::event::{AckPayload, CardCallback, EventEnvelope, EventHandler};
use cardwire_core::lock::InstanceLocks;
use cardwire_core::message::IncomingMessage;
use cardwire_core::params::{to_param_map, to_param_map_from};
use cardwire_core::service::CardService;
use cardwire_core::store::InstanceStore;
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{info, warn};

pub const TEMPLATE_ID: &str = "3d667b86-d30b-43ef-be8c-7fca37965210.schema";

/// One line of the relay list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEntry {
    pub timestamp: String,
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    pub nick: String,
    pub avatar: String,
}

pub type Roster = Vec<RelayEntry>;

/// Posts a relay card titled with the message text.
pub struct GroupRelayBot {
    cards: Arc<dyn CardService>,
}

impl GroupRelayBot {
    pub fn new(cards: Arc<dyn CardService>) -> Self {
        Self { cards }
    }
}

#[async_trait]
impl EventHandler for GroupRelayBot {
    async fn handle(&self, event: &EventEnvelope) -> Result<AckPayload> {
        let msg: IncomingMessage = event.decode()?;
        let data = json!({ "title": msg.text(), "joined": false });
        let instance_id = self
            .cards
            .create_and_deliver(TEMPLATE_ID, to_param_map_from(&data)?, &msg, CreateOptions::default())
            .await?;
        info!(instance_id = %instance_id, title = msg.text(), "Relay card delivered");
        Ok(AckPayload::Success)
    }
}

/// Applies joins and withdrawals, then pushes the new list to the card.
pub struct GroupRelayCallback {
    cards: Arc<dyn CardService>,
    store: Arc<dyn InstanceStore<Roster>>,
    locks: InstanceLocks,
}

enum RelayChange {
    Join(RelayEntry),
    Withdraw(String),
}

impl GroupRelayCallback {
    pub fn new(cards: Arc<dyn CardService>, store: Arc<dyn InstanceStore<Roster>>) -> Self {
        Self {
            cards,
            store,
            locks: InstanceLocks::new(),
        }
    }

    async fn joined_entry(&self, user_id: &str, params: &Map<String, Value>) -> RelayEntry {
        let profile = match self.cards.user_profile(user_id).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(user_id, error = %e, "Profile lookup failed, joining without nick");
                Default::default()
            }
        };
        RelayEntry {
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            uid: user_id.to_string(),
            remark: params.get("remark").and_then(Value::as_str).map(str::to_string),
            nick: profile.name,
            avatar: profile.avatar,
        }
    }

    async fn change_for(&self, user_id: &str, params: &Map<String, Value>) -> RelayChange {
        match params
            .get("delete_uid")
            .and_then(Value::as_str)
            .filter(|uid| !uid.is_empty())
        {
            Some(uid) => RelayChange::Withdraw(uid.to_string()),
            None => RelayChange::Join(self.joined_entry(user_id, params).await),
        }
    }

    async fn apply(&self, id: &CardInstanceId, user_id: &str, change: RelayChange) -> Result<()> {
        let _guard = self.locks.lock(id).await;
        let mut roster = self.store.get(id).await?.unwrap_or_default();

        let joined = match change {
            RelayChange::Withdraw(uid) => {
                roster.retain(|entry| entry.uid != uid);
                info!(instance_id = %id, uid = %uid, remaining = roster.len(), "Relay entry withdrawn");
                false
            }
            RelayChange::Join(entry) => {
                roster.push(entry);
                info!(instance_id = %id, uid = user_id, count = roster.len(), "Joined relay");
                true
            }
        };

        let mut public = Map::new();
        public.insert("content".into(), serde_json::to_value(&roster)?);
        let mut viewer = Map::new();
        viewer.insert("uid".into(), user_id.into());
        viewer.insert("joined".into(), joined.into());
        let private = PrivateDataPatch::from([(user_id.to_string(), to_param_map(&viewer))]);

        // Persist only once the card shows it, so a redelivered event starts
        // from the same list.
        self.cards
            .update(id, Some(to_param_map(&public)), Some(private), UpdateOptions::default())
            .await?;
        self.store.put(id.clone(), roster).await?;
        Ok(())
    }
}

#[async_trait]
impl EventHandler for GroupRelayCallback {
    async fn handle(&self, event: &EventEnvelope) -> Result<AckPayload> {
        let callback: CardCallback = event.decode()?;
        let private = callback.private_data()?;
        // The profile lookup runs before the instance is locked.
        let change = self.change_for(&callback.user_id, &private.params).await;
        self.apply(&callback.out_track_id, &callback.user_id, change)
            .await?;
        Ok(AckPayload::Response(json!({})))
    }
}
