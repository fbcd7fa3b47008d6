//! Form field definitions as the card template renders them.
//!
//! Each field type keeps its current value in exactly one slot, and the slot
//! name is part of the wire format (`default_string`, `default_number`, ...).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of the `form_fields` card variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,

    #[serde(default)]
    pub label: String,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub read_only: bool,

    #[serde(flatten)]
    pub kind: FieldKind,
}

/// The field's type tag together with its value slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldKind {
    Text {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_string: Option<String>,
    },
    Date {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_string: Option<String>,
    },
    Datetime {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_string: Option<String>,
    },
    Select {
        /// Index into `options`; `None` means nothing selected
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_number: Option<i64>,
        #[serde(default)]
        options: Vec<SelectOption>,
    },
    MultiSelect {
        /// Selected indexes into `options`
        #[serde(default)]
        default_number_array: Vec<i64>,
        #[serde(default)]
        options: Vec<SelectOption>,
    },
    Checkbox {
        #[serde(default)]
        default_boolean: bool,
    },
    CheckboxList {
        #[serde(default)]
        checkbox_items: Vec<CheckboxItem>,
    },
    CheckboxListMulti {
        #[serde(default)]
        checkbox_items: Vec<CheckboxItem>,
    },
}

/// A dropdown option. `text` is either plain text or a locale map such as
/// `{"zh_CN": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: Value,
    pub text: Value,
}

/// One row of a checkbox list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckboxItem {
    pub value: Value,
    #[serde(default)]
    pub text: Value,
    #[serde(default)]
    pub checked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Field type tag without the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Text,
    Date,
    Datetime,
    Select,
    MultiSelect,
    Checkbox,
    CheckboxList,
    CheckboxListMulti,
}

impl FieldType {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "TEXT" => Some(Self::Text),
            "DATE" => Some(Self::Date),
            "DATETIME" => Some(Self::Datetime),
            "SELECT" => Some(Self::Select),
            "MULTI_SELECT" => Some(Self::MultiSelect),
            "CHECKBOX" => Some(Self::Checkbox),
            "CHECKBOX_LIST" => Some(Self::CheckboxList),
            "CHECKBOX_LIST_MULTI" => Some(Self::CheckboxListMulti),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Date => "DATE",
            Self::Datetime => "DATETIME",
            Self::Select => "SELECT",
            Self::MultiSelect => "MULTI_SELECT",
            Self::Checkbox => "CHECKBOX",
            Self::CheckboxList => "CHECKBOX_LIST",
            Self::CheckboxListMulti => "CHECKBOX_LIST_MULTI",
        }
    }

    /// Wire key of the slot holding this type's value.
    pub fn value_key(&self) -> &'static str {
        match self {
            Self::Text | Self::Date | Self::Datetime => "default_string",
            Self::Select => "default_number",
            Self::MultiSelect => "default_number_array",
            Self::Checkbox => "default_boolean",
            Self::CheckboxList | Self::CheckboxListMulti => "checkbox_items",
        }
    }

    pub fn is_checkbox_list(&self) -> bool {
        matches!(self, Self::CheckboxList | Self::CheckboxListMulti)
    }
}

impl FieldKind {
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Text { .. } => FieldType::Text,
            Self::Date { .. } => FieldType::Date,
            Self::Datetime { .. } => FieldType::Datetime,
            Self::Select { .. } => FieldType::Select,
            Self::MultiSelect { .. } => FieldType::MultiSelect,
            Self::Checkbox { .. } => FieldType::Checkbox,
            Self::CheckboxList { .. } => FieldType::CheckboxList,
            Self::CheckboxListMulti { .. } => FieldType::CheckboxListMulti,
        }
    }
}

impl FormField {
    pub fn new(name: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            required: false,
            placeholder: None,
            hidden: false,
            read_only: false,
            kind,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn field_type(&self) -> FieldType {
        self.kind.field_type()
    }
}

impl CheckboxItem {
    /// An unchecked item tagged with its owning field.
    pub fn new(field: &str, field_type: FieldType, value: i64, text: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            text: Value::String(text.into()),
            checked: false,
            name: Some(field.to_string()),
            kind: Some(field_type.as_str().to_string()),
        }
    }
}
