//! Form synchronization: fold card callbacks into the stored field list.
//!
//! A callback is one of two things:
//! - a submission, carrying the whole form under `submit_form_fields`, which
//!   is checked for missing required values;
//! - a single field edit, identified by `name` and `type`, which is applied
//!   to the stored field and answered with the full field list so the card
//!   re-renders from one consistent source.
//!
//! Validation failures are normal outcomes, not errors.

use std::sync::Arc;

use cardwire_core::card::CardInstanceId;
use cardwire_core::error::Result;
use cardwire_core::lock::InstanceLocks;
use cardwire_core::params::{CardParamMap, to_param_map};
use cardwire_core::store::InstanceStore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::field::{FieldKind, FieldType, FormField};
use crate::messages::FormMessages;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormStatus {
    #[default]
    Normal,
    Disabled,
}

impl FormStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Disabled => "disabled",
        }
    }
}

/// What the server remembers about one form card.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormState {
    pub fields: Vec<FormField>,
    pub status: FormStatus,
}

/// A single field edit decoded from callback parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    /// TEXT, DATE, DATETIME
    SetText(String),
    /// SELECT; `None` clears the selection
    Select(Option<i64>),
    /// MULTI_SELECT
    SelectMany(Vec<i64>),
    /// Remove one index from a MULTI_SELECT
    RemoveSelected(i64),
    /// CHECKBOX
    ToggleCheckbox,
    /// CHECKBOX_LIST: check the item with this value, uncheck the rest
    CheckOne(Value),
    /// CHECKBOX_LIST_MULTI: flip the item with this value
    ToggleItem(Value),
}

impl FieldUpdate {
    /// Decode the edit and the name of the field it targets.
    ///
    /// The removal chip of a multi-select reports `type: "multiSelect"` with
    /// `remove` set, and nests the removed index under the action id.
    pub fn parse(action_id: Option<&str>, params: &Map<String, Value>) -> Option<(String, Self)> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())?
            .to_string();
        let update_type = params.get("type").and_then(Value::as_str).unwrap_or_default();

        if is_truthy(params.get("remove")) && update_type == "multiSelect" {
            let index = action_id
                .and_then(|id| params.get(id))
                .and_then(|v| v.get("index"))
                .and_then(Value::as_i64)?;
            return Some((name, Self::RemoveSelected(index)));
        }

        let current = params.get(&name);
        let update = match FieldType::parse(update_type)? {
            FieldType::Text | FieldType::Date | FieldType::Datetime => {
                Self::SetText(match current {
                    None | Some(Value::Null) => String::new(),
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                })
            }
            FieldType::Select => {
                Self::Select(current.and_then(|v| v.get("index")).and_then(Value::as_i64))
            }
            FieldType::MultiSelect => Self::SelectMany(
                current
                    .and_then(|v| v.get("index"))
                    .and_then(Value::as_array)
                    .map(|indexes| indexes.iter().filter_map(Value::as_i64).collect())
                    .unwrap_or_default(),
            ),
            FieldType::Checkbox => Self::ToggleCheckbox,
            FieldType::CheckboxList => {
                Self::CheckOne(params.get("value").cloned().unwrap_or(Value::Null))
            }
            FieldType::CheckboxListMulti => {
                Self::ToggleItem(params.get("value").cloned().unwrap_or(Value::Null))
            }
        };
        Some((name, update))
    }

    /// Apply to `field`. Returns `false` when the edit does not fit the
    /// field's type; the field is then left unchanged.
    pub fn apply(&self, field: &mut FormField) -> bool {
        match (self, &mut field.kind) {
            (
                Self::SetText(text),
                FieldKind::Text { default_string }
                | FieldKind::Date { default_string }
                | FieldKind::Datetime { default_string },
            ) => {
                *default_string = Some(text.clone());
            }
            (Self::Select(index), FieldKind::Select { default_number, .. }) => {
                *default_number = *index;
            }
            (Self::SelectMany(indexes), FieldKind::MultiSelect { default_number_array, .. }) => {
                *default_number_array = indexes.clone();
            }
            (Self::RemoveSelected(index), FieldKind::MultiSelect { default_number_array, .. }) => {
                default_number_array.retain(|i| i != index);
            }
            (Self::ToggleCheckbox, FieldKind::Checkbox { default_boolean }) => {
                *default_boolean = !*default_boolean;
            }
            (Self::CheckOne(value), FieldKind::CheckboxList { checkbox_items }) => {
                for item in checkbox_items.iter_mut() {
                    item.checked = same_value(&item.value, value);
                }
            }
            (Self::ToggleItem(value), FieldKind::CheckboxListMulti { checkbox_items }) => {
                for item in checkbox_items.iter_mut().filter(|i| same_value(&i.value, value)) {
                    item.checked = !item.checked;
                }
            }
            _ => return false,
        }
        true
    }
}

/// Result of handling one form callback.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Submission accepted; the form is now locked.
    Submitted,
    /// Submission refused; labels of the empty required fields.
    MissingRequired(Vec<String>),
    /// Submission contained a field type this server does not know.
    InvalidType(String),
    /// A field edit was applied; the full field list after the edit.
    Updated(Vec<FormField>),
    /// Neither a submission nor a recognizable edit.
    ServiceError,
}

pub struct FormSync {
    store: Arc<dyn InstanceStore<FormState>>,
    messages: FormMessages,
    // Held across each read-modify-write of a stored form.
    locks: InstanceLocks,
}

impl FormSync {
    pub fn new(store: Arc<dyn InstanceStore<FormState>>, messages: FormMessages) -> Self {
        Self {
            store,
            messages,
            locks: InstanceLocks::new(),
        }
    }

    pub fn messages(&self) -> &FormMessages {
        &self.messages
    }

    /// Remember the fields a freshly created form card was rendered with.
    pub async fn register(&self, instance_id: CardInstanceId, fields: Vec<FormField>) -> Result<()> {
        self.store
            .put(
                instance_id,
                FormState {
                    fields,
                    status: FormStatus::Normal,
                },
            )
            .await?;
        Ok(())
    }

    pub async fn state(&self, instance_id: &CardInstanceId) -> Result<Option<FormState>> {
        Ok(self.store.get(instance_id).await?)
    }

    /// Handle one callback for `instance_id`.
    pub async fn handle(
        &self,
        instance_id: &CardInstanceId,
        action_id: Option<&str>,
        params: &Map<String, Value>,
    ) -> Result<SyncOutcome> {
        let submitted = params
            .get("submit_form_fields")
            .and_then(Value::as_array)
            .filter(|fields| !fields.is_empty());

        if let Some(raw_fields) = submitted {
            return self.submit(instance_id, raw_fields).await;
        }

        if params.get("name").is_some() {
            return self.update_field(instance_id, action_id, params).await;
        }

        warn!(instance_id = %instance_id, "Form callback carries neither a submission nor a field edit");
        Ok(SyncOutcome::ServiceError)
    }

    async fn submit(&self, instance_id: &CardInstanceId, raw_fields: &[Value]) -> Result<SyncOutcome> {
        match check_required(raw_fields) {
            Err(outcome) => {
                info!(instance_id = %instance_id, outcome = ?outcome, "Form submission refused");
                Ok(outcome)
            }
            Ok(()) => {
                let _guard = self.locks.lock(instance_id).await;
                let previous = self.store.get(instance_id).await?.unwrap_or_default();
                let fields = match serde_json::from_value::<Vec<FormField>>(Value::Array(
                    raw_fields.to_vec(),
                )) {
                    Ok(fields) => fields,
                    Err(e) => {
                        warn!(instance_id = %instance_id, error = %e, "Submitted fields do not parse, keeping stored ones");
                        previous.fields
                    }
                };
                self.store
                    .put(
                        instance_id.clone(),
                        FormState {
                            fields,
                            status: FormStatus::Disabled,
                        },
                    )
                    .await?;
                info!(instance_id = %instance_id, "Form submitted");
                Ok(SyncOutcome::Submitted)
            }
        }
    }

    async fn update_field(
        &self,
        instance_id: &CardInstanceId,
        action_id: Option<&str>,
        params: &Map<String, Value>,
    ) -> Result<SyncOutcome> {
        let Some((name, update)) = FieldUpdate::parse(action_id, params) else {
            warn!(instance_id = %instance_id, params = ?params, "Unrecognized field edit");
            return Ok(SyncOutcome::ServiceError);
        };

        let _guard = self.locks.lock(instance_id).await;
        let Some(mut state) = self.store.get(instance_id).await? else {
            debug!(instance_id = %instance_id, field = %name, "No stored form for instance");
            return Ok(SyncOutcome::Updated(Vec::new()));
        };

        let applied = match state.fields.iter_mut().find(|f| f.name == name) {
            Some(field) => {
                let applied = update.apply(field);
                if !applied {
                    warn!(
                        instance_id = %instance_id,
                        field = %name,
                        field_type = field.field_type().as_str(),
                        update = ?update,
                        "Edit does not match field type"
                    );
                }
                applied
            }
            None => {
                warn!(instance_id = %instance_id, field = %name, "Edited field not in form");
                false
            }
        };

        if applied {
            debug!(instance_id = %instance_id, field = %name, update = ?update, "Field updated");
            self.store.put(instance_id.clone(), state.clone()).await?;
        }

        Ok(SyncOutcome::Updated(state.fields))
    }

    /// The private data the viewer should receive for `outcome`.
    pub fn private_data(&self, outcome: &SyncOutcome) -> Result<CardParamMap> {
        let mut data = Map::new();
        match outcome {
            SyncOutcome::Submitted => {
                data.insert("form_status".into(), FormStatus::Disabled.as_str().into());
                data.insert("button_text".into(), self.messages.submitted().into());
                data.insert("err_msg".into(), "".into());
            }
            SyncOutcome::MissingRequired(labels) => {
                data.insert("err_msg".into(), self.messages.missing_required(labels).into());
            }
            SyncOutcome::InvalidType(field_type) => {
                data.insert("err_msg".into(), self.messages.invalid_type(field_type).into());
            }
            SyncOutcome::Updated(fields) => {
                data.insert("form_fields".into(), serde_json::to_value(fields)?);
            }
            SyncOutcome::ServiceError => {
                data.insert("err_msg".into(), self.messages.service_error().into());
            }
        }
        Ok(to_param_map(&data))
    }
}

/// Check required fields of a submission, in order.
///
/// An unknown field type stops the check immediately.
fn check_required(raw_fields: &[Value]) -> std::result::Result<(), SyncOutcome> {
    let mut missing = Vec::new();

    for raw in raw_fields {
        let tag = match raw.get("type") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let Some(field_type) = FieldType::parse(&tag) else {
            return Err(SyncOutcome::InvalidType(tag));
        };

        let required = raw.get("required").and_then(Value::as_bool).unwrap_or(false);
        if !required {
            continue;
        }

        let value = raw.get(field_type.value_key());
        let filled = match field_type {
            FieldType::CheckboxList | FieldType::CheckboxListMulti => value
                .and_then(Value::as_array)
                .is_some_and(|items| {
                    items
                        .iter()
                        .any(|item| item.get("checked").and_then(Value::as_bool) == Some(true))
                }),
            FieldType::Select => value.and_then(Value::as_i64).is_some_and(|n| n >= 0),
            _ => is_truthy(value),
        };

        if !filled {
            let label = raw
                .get("label")
                .and_then(Value::as_str)
                .filter(|l| !l.is_empty())
                .or_else(|| raw.get("name").and_then(Value::as_str))
                .unwrap_or_default();
            missing.push(label.to_string());
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(SyncOutcome::MissingRequired(missing))
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

/// Checkbox values arrive as numbers or strings depending on the client.
fn same_value(a: &Value, b: &Value) -> bool {
    fn text(v: &Value) -> String {
        match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
    a == b || text(a) == text(b)
}
