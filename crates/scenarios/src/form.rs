//! Form card backed by server-side field state.

use std::sync::Arc;

use async_trait::async_trait;
use cardwire_core::card::{CallbackReply, CreateOptions};
use cardwire_core::error::Result;
use cardwire_core::event::{AckPayload, CardCallback, EventEnvelope, EventHandler};
use cardwire_core::message::IncomingMessage;
use cardwire_core::params::to_param_map;
use cardwire_core::service::CardService;
use cardwire_forms::{
    CheckboxItem, FieldKind, FieldType, FormField, FormStatus, FormSync, SelectOption,
};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

pub const TEMPLATE_ID: &str = "9f86e003-e65e-4680-bf4b-8df5958d9f17.schema";

/// The fields every demo form starts with.
pub fn demo_fields() -> Vec<FormField> {
    vec![
        FormField::new("text_required", "必填文本输入", text(Some(""))).required().placeholder("请输入文本"),
        FormField::new("text", "文本输入", text(Some(""))).placeholder("请输入文本"),
        FormField::new("date_required", "必填日期选择", FieldKind::Date { default_string: None })
            .required()
            .placeholder("请选择日期"),
        FormField::new(
            "date",
            "日期选择",
            FieldKind::Date {
                default_string: Some("2024-06-06".into()),
            },
        )
        .placeholder("请选择日期"),
        FormField::new("datetime_required", "必填日期时间选择", FieldKind::Datetime { default_string: None })
            .required()
            .placeholder("请选择日期时间"),
        FormField::new(
            "datetime",
            "日期时间选择",
            FieldKind::Datetime {
                default_string: Some("2024-06-06 12:00".into()),
            },
        )
        .placeholder("请选择日期时间"),
        FormField::new(
            "select_required",
            "必填单选下拉框",
            FieldKind::Select {
                default_number: None,
                options: select_options(),
            },
        )
        .required()
        .placeholder("单选请选择"),
        FormField::new(
            "select",
            "单选下拉框",
            FieldKind::Select {
                default_number: Some(1),
                options: select_options(),
            },
        )
        .placeholder("单选请选择"),
        FormField::new(
            "multi_select",
            "必填多选下拉框",
            FieldKind::MultiSelect {
                default_number_array: vec![0, 2],
                options: select_options(),
            },
        )
        .required()
        .placeholder("多选请选择"),
        FormField::new(
            "checkbox_list",
            "必填单选列表",
            FieldKind::CheckboxList {
                checkbox_items: checkbox_items("checkbox_list", FieldType::CheckboxList, &[]),
            },
        )
        .required(),
        FormField::new(
            "checkbox_list_multi",
            "必填多选列表",
            FieldKind::CheckboxListMulti {
                checkbox_items: checkbox_items("checkbox_list_multi", FieldType::CheckboxListMulti, &[1, 3]),
            },
        )
        .required(),
        FormField::new("checkbox", "复选框", FieldKind::Checkbox { default_boolean: false }),
        FormField::new("checkbox_default_true", "复选框默认勾选", FieldKind::Checkbox { default_boolean: true }),
    ]
}

fn text(default: Option<&str>) -> FieldKind {
    FieldKind::Text {
        default_string: default.map(str::to_string),
    }
}

fn select_options() -> Vec<SelectOption> {
    (1..=4)
        .map(|n| SelectOption {
            value: n.into(),
            text: json!({ "zh_CN": format!("选项 {n}") }),
        })
        .collect()
}

fn checkbox_items(field: &str, field_type: FieldType, checked: &[i64]) -> Vec<CheckboxItem> {
    (0..4)
        .map(|n| {
            let mut item = CheckboxItem::new(field, field_type, n, format!("选项 {n}"));
            item.checked = checked.contains(&n);
            item
        })
        .collect()
}

/// Posts a fresh form card and remembers its fields.
pub struct FormBot {
    cards: Arc<dyn CardService>,
    sync: Arc<FormSync>,
}

impl FormBot {
    pub fn new(cards: Arc<dyn CardService>, sync: Arc<FormSync>) -> Self {
        Self { cards, sync }
    }
}

#[async_trait]
impl EventHandler for FormBot {
    async fn handle(&self, event: &EventEnvelope) -> Result<AckPayload> {
        let msg: IncomingMessage = event.decode()?;
        let fields = demo_fields();

        let mut data = Map::new();
        data.insert("form_fields".into(), serde_json::to_value(&fields)?);
        data.insert("form_status".into(), FormStatus::Normal.as_str().into());
        data.insert("button_text".into(), self.sync.messages().submit().into());
        data.insert("title".into(), Value::from(msg.text()));
        data.insert("err_msg".into(), "".into());

        let instance_id = self
            .cards
            .create_and_deliver(TEMPLATE_ID, to_param_map(&data), &msg, CreateOptions::default())
            .await?;
        info!(instance_id = %instance_id, fields = fields.len(), "Form card delivered");
        self.sync.register(instance_id, fields).await?;
        Ok(AckPayload::Success)
    }
}

/// Runs form interactions through [`FormSync`].
pub struct FormCallback {
    sync: Arc<FormSync>,
}

impl FormCallback {
    pub fn new(sync: Arc<FormSync>) -> Self {
        Self { sync }
    }
}

#[async_trait]
impl EventHandler for FormCallback {
    async fn handle(&self, event: &EventEnvelope) -> Result<AckPayload> {
        let callback: CardCallback = event.decode()?;
        let private = callback.private_data()?;
        let outcome = self
            .sync
            .handle(&callback.out_track_id, private.first_action_id(), &private.params)
            .await?;
        debug!(instance_id = %callback.out_track_id, user_id = %callback.user_id, outcome = ?outcome, "Form callback handled");

        let reply = CallbackReply::new(None, Some(self.sync.private_data(&outcome)?));
        AckPayload::response(&reply)
    }
}
