//! Open-typed values carried by some wire fields (for example scale rule metadata).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A string, number, boolean or ordered map as sent by the remote API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DynamicValue {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Map(IndexMap<String, DynamicValue>),
}

impl DynamicValue {
    /// Render the value the way local state stores it.
    ///
    /// Strings are returned as-is, numbers and booleans in their JSON spelling and maps as
    /// compact JSON.
    pub fn as_text(&self) -> String {
        match self {
            DynamicValue::String(s) => s.clone(),
            DynamicValue::Bool(b) => b.to_string(),
            DynamicValue::Number(n) => n.to_string(),
            DynamicValue::Map(_) => serde_json::to_string(self).unwrap_or_default(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DynamicValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for DynamicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for DynamicValue {
    fn from(value: &str) -> Self {
        DynamicValue::String(value.to_string())
    }
}

impl From<String> for DynamicValue {
    fn from(value: String) -> Self {
        DynamicValue::String(value)
    }
}

impl From<bool> for DynamicValue {
    fn from(value: bool) -> Self {
        DynamicValue::Bool(value)
    }
}

impl From<i64> for DynamicValue {
    fn from(value: i64) -> Self {
        DynamicValue::Number(value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_each_shape() {
        let decoded: IndexMap<String, DynamicValue> = serde_json::from_str(
            r#"{"queueName":"jobs","queueLength":5,"activate":true,"nested":{"b":"2","a":1}}"#,
        )
        .unwrap();

        assert_eq!(decoded["queueName"], DynamicValue::from("jobs"));
        assert_eq!(decoded["queueLength"], DynamicValue::from(5));
        assert_eq!(decoded["activate"], DynamicValue::from(true));
        assert!(matches!(decoded["nested"], DynamicValue::Map(_)));
    }

    #[test]
    fn text_form_is_stable_and_keeps_map_order() {
        let decoded: DynamicValue = serde_json::from_str(r#"{"b":"2","a":1}"#).unwrap();
        assert_eq!(decoded.as_text(), r#"{"b":"2","a":1}"#);
        assert_eq!(DynamicValue::from(5).as_text(), "5");
        assert_eq!(DynamicValue::from(false).to_string(), "false");
        assert_eq!(DynamicValue::from("x").as_str(), Some("x"));
    }
}
