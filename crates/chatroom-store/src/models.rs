//! Document model of the hosted database.
//!
//! Reads produce [`Value`]s; writes take [`FieldValue`]s so that a field can
//! carry the server-timestamp sentinel instead of a concrete value.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chatroom_shared::types::Direction;

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A stored field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Value {
    Null,
    String(String),
    Timestamp(DateTime<Utc>),
}

/// A field value on the write path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Set(Value),
    /// Replaced by the commit instant on the server.
    ServerTimestamp,
}

impl FieldValue {
    pub fn string(s: impl Into<String>) -> Self {
        FieldValue::Set(Value::String(s.into()))
    }

    pub fn timestamp(at: DateTime<Utc>) -> Self {
        FieldValue::Set(Value::Timestamp(at))
    }
}

pub type Fields = BTreeMap<String, Value>;
pub type WriteFields = BTreeMap<String, FieldValue>;

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// A document as seen by a reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSnapshot {
    /// Server-assigned document id.
    pub id: String,
    /// Fields still waiting for a server timestamp read as `Value::Null`.
    pub fields: Fields,
    /// Whether a sentinel in this document has not been resolved yet.
    pub has_pending_writes: bool,
}

impl DocumentSnapshot {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        match self.fields.get(field) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        match self.fields.get(field) {
            Some(Value::Timestamp(at)) => Some(*at),
            _ => None,
        }
    }
}

/// Result of a live query at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QuerySnapshot {
    pub docs: Vec<DocumentSnapshot>,
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub collection: String,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(name: &str) -> Self {
        Self {
            collection: name.to_string(),
            order_by: None,
            limit: None,
        }
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let mut fields = Fields::new();
        fields.insert("body".into(), Value::String("hi".into()));
        fields.insert("timestamp".into(), Value::Null);
        let doc = DocumentSnapshot {
            id: "m1".into(),
            fields,
            has_pending_writes: true,
        };

        assert_eq!(doc.get_str("body"), Some("hi"));
        assert_eq!(doc.get_str("timestamp"), None);
        assert_eq!(doc.get_timestamp("timestamp"), None);
        assert_eq!(doc.get("missing"), None);
    }

    #[test]
    fn test_value_encoding_is_tagged() {
        let json = serde_json::to_value(Value::String("hi".into())).unwrap();
        assert_eq!(json, serde_json::json!({"type": "string", "value": "hi"}));
        let json = serde_json::to_value(Value::Null).unwrap();
        assert_eq!(json, serde_json::json!({"type": "null"}));
    }
}
