//! Expense approval card.
//!
//! The bot posts a reimbursement request; approvers answer with buttons or
//! with the embedded form, and every answer becomes a public data patch.

use std::sync::Arc;

use async_trait::async_trait;
use cardwire_core::card::{CallbackReply, CreateOptions};
use cardwire_core::error::Result;
use cardwire_core::event::{AckPayload, CardCallback, EventEnvelope, EventHandler};
use cardwire_core::message::IncomingMessage;
use cardwire_core::params::{CardParamMap, to_param_map, to_param_map_from};
use cardwire_core::service::CardService;
use cardwire_forms::FormMessages;
use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

pub const TEMPLATE_ID: &str = "db56f2c2-f609-4878-9a34-46f6a0194a73.schema";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApprovalCard {
    last_message: String,
    title: String,
    #[serde(rename = "type")]
    expense_type: String,
    amount: String,
    reason: String,
    create_time: String,
    status: String,
}

impl ApprovalCard {
    fn new(requester: &str, created_at: DateTime<Local>) -> Self {
        let requester = if requester.is_empty() { "朱小志" } else { requester };
        Self {
            last_message: "审批".into(),
            title: format!("{requester}提交的财务报销"),
            expense_type: "差旅费".into(),
            amount: "1000元".into(),
            reason: "出差费用".into(),
            create_time: created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            status: String::new(),
        }
    }
}

/// Posts an approval card in reply to any robot message.
pub struct ApprovalBot {
    cards: Arc<dyn CardService>,
}

impl ApprovalBot {
    pub fn new(cards: Arc<dyn CardService>) -> Self {
        Self { cards }
    }
}

#[async_trait]
impl EventHandler for ApprovalBot {
    async fn handle(&self, event: &EventEnvelope) -> Result<AckPayload> {
        let msg: IncomingMessage = event.decode()?;
        let card = ApprovalCard::new(&msg.sender_nick, Local::now());
        let instance_id = self
            .cards
            .create_and_deliver(TEMPLATE_ID, to_param_map_from(&card)?, &msg, CreateOptions::default())
            .await?;
        info!(instance_id = %instance_id, requester = %msg.sender_nick, "Approval card delivered");
        Ok(AckPayload::Success)
    }
}

/// Turns approval interactions into public card patches.
pub struct ApprovalCallback {
    messages: FormMessages,
}

impl ApprovalCallback {
    pub fn new(messages: FormMessages) -> Self {
        Self { messages }
    }
}

#[async_trait]
impl EventHandler for ApprovalCallback {
    async fn handle(&self, event: &EventEnvelope) -> Result<AckPayload> {
        let callback: CardCallback = event.decode()?;
        let private = callback.private_data()?;
        let patch = approval_patch(&private.params, self.messages.submitted());
        let keys: Vec<&String> = patch.keys().collect();
        debug!(instance_id = %callback.out_track_id, ?keys, "Approval patch");

        let reply = CallbackReply::new(Some(to_param_map(&patch)), Some(CardParamMap::new()));
        AckPayload::response(&reply)
    }
}

/// Public data changes for one approval action.
fn approval_patch(params: &Map<String, Value>, submitted_text: &str) -> Map<String, Value> {
    let mut patch = Map::new();
    match params.get("action").and_then(Value::as_str) {
        Some(action @ ("agree" | "reject")) => {
            info!(action, "Approval decided");
            patch.insert("status".into(), action.into());
        }
        Some("submit_form") => {
            let mut form_info = object_param(params, "form_info");
            let mut form_data = object_param(params, "form_data");
            info!(?form_data, ?form_info, "Approval form submitted");

            form_info.insert("submitBtnText".into(), submitted_text.into());
            form_info.insert("submitBtnStatus".into(), "disabled".into());
            let type_index = form_data
                .get("type")
                .and_then(|t| t.get("index"))
                .cloned()
                .unwrap_or_else(|| Value::from(-1));
            form_data.insert("typeIndex".into(), type_index);

            patch.insert("formInfo".into(), Value::Object(form_info));
            patch.insert("formData".into(), Value::Object(form_data));
        }
        Some("submit_dislike") => {
            let reasons: Vec<&str> = params
                .get("dislike_reason")
                .and_then(Value::as_array)
                .map(|r| r.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            let custom = params
                .get("custom_dislike_reason")
                .and_then(Value::as_str)
                .unwrap_or("");
            info!(reasons = %reasons.join("、"), custom, "Dislike submitted");
            patch.insert("submitted".into(), true.into());
        }
        other => debug!(action = ?other, "Ignoring approval action"),
    }
    patch
}

fn object_param(params: &Map<String, Value>, key: &str) -> Map<String, Value> {
    match params.get(key) {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingCardService, callback_event, reply_params, robot_event};
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn bot_delivers_approval_card() {
        let cards = Arc::new(RecordingCardService::default());
        let bot = ApprovalBot::new(cards.clone());

        let ack = bot.handle(&robot_event("报销")).await.unwrap();
        assert_eq!(ack, AckPayload::Success);

        let created = cards.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].template_id, TEMPLATE_ID);
        let data = &created[0].public_data;
        assert_eq!(data["title"], "Alice提交的财务报销");
        assert_eq!(data["type"], "差旅费");
        assert_eq!(data["status"], "");
        assert_eq!(data["createTime"].len(), "2023-10-10 10:10:10".len());
    }

    #[test]
    fn agree_and_reject_set_status() {
        let patch = approval_patch(&params(json!({ "action": "agree" })), "已提交");
        assert_eq!(patch, params(json!({ "status": "agree" })));
        let patch = approval_patch(&params(json!({ "action": "reject" })), "已提交");
        assert_eq!(patch, params(json!({ "status": "reject" })));
    }

    #[test]
    fn submit_form_locks_form_and_echoes_type_index() {
        let patch = approval_patch(
            &params(json!({
                "action": "submit_form",
                "form_info": { "title": "审批", "submitBtnStatus": "normal" },
                "form_data": { "type": { "index": 2, "value": "差旅费" }, "days": 3 }
            })),
            "已提交",
        );
        assert_eq!(
            patch["formInfo"],
            json!({ "title": "审批", "submitBtnText": "已提交", "submitBtnStatus": "disabled" })
        );
        assert_eq!(patch["formData"]["typeIndex"], json!(2));
        assert_eq!(patch["formData"]["days"], json!(3));
    }

    #[test]
    fn submit_form_without_type_uses_minus_one() {
        let patch = approval_patch(&params(json!({ "action": "submit_form" })), "Submitted");
        assert_eq!(patch["formData"], json!({ "typeIndex": -1 }));
        assert_eq!(patch["formInfo"]["submitBtnText"], json!("Submitted"));
    }

    #[test]
    fn unknown_action_patches_nothing() {
        assert!(approval_patch(&params(json!({ "action": "wave" })), "已提交").is_empty());
        assert!(approval_patch(&Map::new(), "已提交").is_empty());
    }

    #[tokio::test]
    async fn callback_replies_with_public_patch() {
        let handler = ApprovalCallback::new(FormMessages::default());
        let event = callback_event("card-1", "u1", &[], json!({ "action": "submit_dislike", "dislike_reason": ["慢"] }));

        let ack = handler.handle(&event).await.unwrap();
        assert_eq!(reply_params(&ack, "cardData"), json!({ "submitted": "true" }));
        assert_eq!(reply_params(&ack, "userPrivateData"), json!({}));
    }
}
