use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_WINDOW, FIELD_TIMESTAMP};
use crate::identity::Identity;

// Server-assigned document id. Opaque, unique within the collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message fields as read from the store. `timestamp` is `None` while the
/// server-side sentinel has not been resolved yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageData {
    pub body: String,
    pub user: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Ordering instant of a displayed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "at", rename_all = "camelCase")]
pub enum Timestamp {
    /// Authoritative instant recorded by the server.
    Server(DateTime<Utc>),
    /// Local clock reading used until the server instant arrives.
    LocalFallback(DateTime<Utc>),
}

impl Timestamp {
    pub fn resolve(server: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match server {
            Some(at) => Timestamp::Server(at),
            None => Timestamp::LocalFallback(now),
        }
    }

    pub fn instant(&self) -> DateTime<Utc> {
        match self {
            Timestamp::Server(at) | Timestamp::LocalFallback(at) => *at,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Timestamp::LocalFallback(_))
    }
}

/// A message held by the view model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub body: String,
    pub user: String,
    pub timestamp: Timestamp,
}

impl Message {
    pub fn from_data(id: MessageId, data: MessageData, now: DateTime<Utc>) -> Self {
        Self {
            id,
            body: data.body,
            user: data.user,
            timestamp: Timestamp::resolve(data.timestamp, now),
        }
    }

    /// Newest first; equal instants fall back to ascending id.
    pub fn display_order(a: &Message, b: &Message) -> Ordering {
        b.timestamp
            .instant()
            .cmp(&a.timestamp.instant())
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// What the user submits. `created_at` is a client-side placeholder; the
/// store replaces it with the server timestamp on write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub body: String,
    pub user: String,
    pub created_at: DateTime<Utc>,
}

impl Draft {
    /// Returns `None` for an empty body.
    pub fn compose(body: &str, author: &Identity) -> Option<Self> {
        if body.is_empty() {
            return None;
        }
        Some(Self {
            body: body.to_string(),
            user: author.display_name.clone(),
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

/// The tail of the collection a view subscribes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionWindow {
    pub order_by: &'static str,
    pub direction: Direction,
    pub limit: usize,
}

impl SubscriptionWindow {
    /// Newest `limit` messages by timestamp. A zero limit is raised to one.
    pub fn tail(limit: usize) -> Self {
        Self {
            order_by: FIELD_TIMESTAMP,
            direction: Direction::Descending,
            limit: limit.max(1),
        }
    }
}

impl Default for SubscriptionWindow {
    fn default() -> Self {
        Self::tail(DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, secs).unwrap()
    }

    fn message(id: &str, ts: Timestamp) -> Message {
        Message {
            id: id.into(),
            body: "b".to_string(),
            user: "u".to_string(),
            timestamp: ts,
        }
    }

    #[test]
    fn test_null_timestamp_becomes_fallback() {
        let ts = Timestamp::resolve(None, at(5));
        assert!(ts.is_fallback());
        assert_eq!(ts.instant(), at(5));

        let ts = Timestamp::resolve(Some(at(3)), at(5));
        assert_eq!(ts, Timestamp::Server(at(3)));
    }

    #[test]
    fn test_display_order_newest_first_then_id() {
        let mut list = vec![
            message("b", Timestamp::Server(at(1))),
            message("c", Timestamp::Server(at(2))),
            message("a", Timestamp::Server(at(1))),
        ];
        list.sort_by(Message::display_order);
        let ids: Vec<&str> = list.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_compose_rejects_empty_body() {
        let author = Identity::from_profile(Some("Alice"), Some("a@x"), None);
        assert!(Draft::compose("", &author).is_none());

        let draft = Draft::compose(" hi ", &author).unwrap();
        assert_eq!(draft.body, " hi ");
        assert_eq!(draft.user, "Alice");
    }

    #[test]
    fn test_default_window() {
        let window = SubscriptionWindow::default();
        assert_eq!(window.limit, 10);
        assert_eq!(window.order_by, "timestamp");
        assert_eq!(window.direction, Direction::Descending);
        assert_eq!(SubscriptionWindow::tail(0).limit, 1);
    }

    #[test]
    fn test_timestamp_encoding_names_its_source() {
        let json = serde_json::to_value(Timestamp::Server(at(0))).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"source": "server", "at": "2024-01-01T00:00:00Z"})
        );
        let json = serde_json::to_value(Timestamp::LocalFallback(at(5))).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"source": "localFallback", "at": "2024-01-01T00:00:05Z"})
        );
        assert_eq!(
            serde_json::from_value::<Timestamp>(json).unwrap(),
            Timestamp::LocalFallback(at(5))
        );
    }
}
