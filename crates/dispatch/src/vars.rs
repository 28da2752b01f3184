//! Template variable resolution.
//!
//! Callers may pass template variables either as a positional array or as a
//! named object. Both shapes are resolved once, at the dispatch boundary,
//! into a canonical ordered list before anything reaches a provider.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Positional or named template variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateVars {
    Positional(Vec<String>),
    Named(serde_json::Map<String, Value>),
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl TemplateVars {
    /// Parse the `vars` jsonb column of a queued job.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(TemplateVars::Positional(
                items.iter().map(stringify).collect(),
            )),
            Value::Object(map) => Some(TemplateVars::Named(map.clone())),
            _ => None,
        }
    }

    /// Resolve into the canonical positional list.
    ///
    /// Named variables are ordered by the registry's `var_order` when one
    /// exists; otherwise the object's own key order is used.
    pub fn resolve(&self, var_order: Option<&[String]>) -> Vec<String> {
        match self {
            TemplateVars::Positional(items) => items.clone(),
            TemplateVars::Named(map) => match var_order {
                Some(order) if !order.is_empty() => order
                    .iter()
                    .map(|key| map.get(key).map(stringify).unwrap_or_default())
                    .collect(),
                _ => map.values().map(stringify).collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn positional_passes_through() {
        let vars = TemplateVars::from_value(&json!(["a", "b"])).unwrap();
        assert_eq!(vars.resolve(None), vec!["a", "b"]);
    }

    #[test]
    fn named_resolved_by_registry_order() {
        let vars = TemplateVars::from_value(&json!({
            "amount": "500", "name": "Alice", "period": "March"
        }))
        .unwrap();
        let order = vec![
            "name".to_string(),
            "period".to_string(),
            "amount".to_string(),
        ];
        assert_eq!(vars.resolve(Some(&order)), vec!["Alice", "March", "500"]);
    }

    #[test]
    fn named_missing_key_becomes_empty() {
        let vars = TemplateVars::from_value(&json!({ "name": "Alice" })).unwrap();
        let order = vec!["name".to_string(), "amount".to_string()];
        assert_eq!(vars.resolve(Some(&order)), vec!["Alice", ""]);
    }

    #[test]
    fn named_falls_back_to_object_key_order() {
        let vars = TemplateVars::from_value(&json!({
            "first": "1", "second": "2", "third": "3"
        }))
        .unwrap();
        assert_eq!(vars.resolve(None), vec!["1", "2", "3"]);
    }

    #[test]
    fn non_string_values_stringified() {
        let vars = TemplateVars::from_value(&json!([42, true, null])).unwrap();
        assert_eq!(vars.resolve(None), vec!["42", "true", ""]);
    }

    #[test]
    fn deserializes_both_shapes() {
        let positional: TemplateVars = serde_json::from_value(json!(["x"])).unwrap();
        assert!(matches!(positional, TemplateVars::Positional(_)));

        let named: TemplateVars = serde_json::from_value(json!({"k": "v"})).unwrap();
        assert!(matches!(named, TemplateVars::Named(_)));
    }
}
