//! Conversation history normalisation
//!
//! The history column arrives either as a JSON array or as a string that
//! holds serialized JSON, depending on how the row was written. Every reader
//! goes through [`normalize_history`]; anything that cannot be decoded to an
//! array becomes an empty history.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Role used by the automated agent in conversation entries
pub const AGENT_ROLE: &str = "agent";

/// One message of a lead's conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: String,
    pub content: String,
    /// Remaining keys of the entry (timestamps, ids, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConversationEntry {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            extra: Map::new(),
        }
    }

    /// Build an entry from one array element; non-objects are not entries
    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;

        let role = obj
            .get("role")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let content = match obj.get("content").or_else(|| obj.get("message")) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        let extra = obj
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), "role" | "content" | "message"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Some(Self {
            role,
            content,
            extra,
        })
    }
}

/// Normalise a history column into an ordered list of entries
///
/// Accepts a native array or a string holding a serialized array. Missing,
/// null, undecodable or non-array values yield an empty list.
pub fn normalize_history(value: Option<&Value>) -> Vec<ConversationEntry> {
    match value {
        Some(Value::Array(items)) => entries(items),
        Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Array(items)) => entries(&items),
            Ok(_) => {
                tracing::debug!("Serialized conversation history is not an array");
                Vec::new()
            }
            Err(e) => {
                tracing::debug!(error = %e, "Undecodable conversation history");
                Vec::new()
            }
        },
        _ => Vec::new(),
    }
}

fn entries(items: &[Value]) -> Vec<ConversationEntry> {
    items.iter().filter_map(ConversationEntry::from_value).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_native_array() {
        let value = json!([
            {"role": "user", "content": "Bonjour"},
            {"role": "agent", "content": "Bonjour, comment puis-je aider ?", "ts": 1}
        ]);
        let history = normalize_history(Some(&value));

        assert_eq!(history.len(), 2);
        assert_eq!(history[0], ConversationEntry::new("user", "Bonjour"));
        assert_eq!(history[1].role, AGENT_ROLE);
        assert_eq!(history[1].extra.get("ts"), Some(&json!(1)));
    }

    #[test]
    fn test_serialized_string() {
        let value = json!("[{\"role\":\"agent\",\"content\":\"Hi\"}]");
        let history = normalize_history(Some(&value));
        assert_eq!(history, vec![ConversationEntry::new("agent", "Hi")]);
    }

    #[test]
    fn test_invalid_inputs_are_empty() {
        assert!(normalize_history(None).is_empty());
        assert!(normalize_history(Some(&json!(null))).is_empty());
        assert!(normalize_history(Some(&json!("not valid json"))).is_empty());
        assert!(normalize_history(Some(&json!("{\"role\":\"agent\"}"))).is_empty());
        assert!(normalize_history(Some(&json!(12))).is_empty());
        assert!(normalize_history(Some(&json!({"role": "agent"}))).is_empty());
    }

    #[test]
    fn test_non_object_elements_skipped() {
        let value = json!(["hello", {"role": "agent", "message": "Hi"}, 3]);
        let history = normalize_history(Some(&value));
        assert_eq!(history, vec![ConversationEntry::new("agent", "Hi")]);
    }
}
