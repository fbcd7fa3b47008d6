//! Card parameter maps: the all-string wire shape of card data.
//!
//! The card API only accepts string values inside `cardParamMap`. Anything
//! richer (numbers, booleans, arrays, objects) travels JSON-encoded, and
//! nulls are left out entirely.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Field key → string value, ready for `cardParamMap`.
pub type CardParamMap = BTreeMap<String, String>;

/// Convert a JSON object into a [`CardParamMap`].
///
/// Strings pass through untouched, `null` entries are dropped, and every
/// other value is JSON-encoded.
pub fn to_param_map(values: &Map<String, Value>) -> CardParamMap {
    values
        .iter()
        .filter_map(|(key, value)| encode_value(value).map(|v| (key.clone(), v)))
        .collect()
}

/// Serialize any struct that maps to a JSON object into a [`CardParamMap`].
pub fn to_param_map_from<T: Serialize>(data: &T) -> Result<CardParamMap> {
    match serde_json::to_value(data)? {
        Value::Object(map) => Ok(to_param_map(&map)),
        other => Err(Error::Internal(format!(
            "card data must serialize to an object, got {}",
            json_kind(&other)
        ))),
    }
}

fn encode_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn numbers_encoded_strings_kept_nulls_dropped() {
        let params = to_param_map(&object(json!({ "a": 1, "b": "x", "c": null })));
        assert_eq!(params.len(), 2);
        assert_eq!(params["a"], "1");
        assert_eq!(params["b"], "x");
        assert!(!params.contains_key("c"));
    }

    #[test]
    fn nested_values_become_json_text() {
        let params = to_param_map(&object(json!({
            "config": { "autoLayout": true },
            "items": [1, 2],
            "joined": false
        })));
        assert_eq!(params["config"], r#"{"autoLayout":true}"#);
        assert_eq!(params["items"], "[1,2]");
        assert_eq!(params["joined"], "false");
    }

    #[test]
    fn applying_twice_is_a_no_op() {
        let once = to_param_map(&object(json!({ "a": 1, "b": "x", "c": [true] })));
        let as_json: Map<String, Value> = once
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let twice = to_param_map(&as_json);
        assert_eq!(once, twice);
    }

    #[test]
    fn typed_struct_conversion() {
        #[derive(Serialize)]
        struct Progress {
            finished: u32,
            title: String,
            note: Option<String>,
        }
        let params = to_param_map_from(&Progress {
            finished: 3,
            title: "sprint".into(),
            note: None,
        })
        .unwrap();
        assert_eq!(params["finished"], "3");
        assert_eq!(params["title"], "sprint");
        assert!(!params.contains_key("note"));
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(to_param_map_from(&vec![1, 2, 3]).is_err());
    }
}
