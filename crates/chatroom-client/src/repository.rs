//! Message repository: the narrow facade over the `messages` collection.
//!
//! Exactly two operations are exposed: a live tail subscription and an
//! append. The repository never reorders deliveries; ordering is the view
//! model's job.

use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use chatroom_shared::constants::{FIELD_BODY, FIELD_TIMESTAMP, FIELD_USER, MESSAGES_COLLECTION};
use chatroom_shared::{AppendError, ChatError, Draft, MessageData, MessageId, SubscriptionWindow};
use chatroom_store::{
    Database, DocumentSnapshot, FieldValue, ListenerRegistration, Query, QuerySnapshot,
    StoreError, WriteFields,
};

/// One item of a live subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Message { id: MessageId, data: MessageData },
    Failed(ChatError),
}

pub trait MessageRepository: Send + Sync + 'static {
    /// Open a live tail of the newest `window.limit` messages.
    fn subscribe(&self, window: &SubscriptionWindow) -> Subscription;

    /// Persist `draft` with a server-side timestamp. Resolves once the
    /// server has acknowledged the write.
    fn append(&self, draft: Draft) -> BoxFuture<'static, Result<(), AppendError>>;
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

type Closer = Box<dyn FnOnce() + Send>;

/// A lazy, non-restartable stream of deliveries with an explicit close.
///
/// After [`Subscription::close`] returns the stream yields nothing more.
pub struct Subscription {
    deliveries: Option<BoxStream<'static, Delivery>>,
    closer: Option<Closer>,
}

impl Subscription {
    pub fn new<S>(deliveries: S, closer: impl FnOnce() + Send + 'static) -> Self
    where
        S: Stream<Item = Delivery> + Send + 'static,
    {
        Self {
            deliveries: Some(deliveries.boxed()),
            closer: Some(Box::new(closer)),
        }
    }

    /// A subscription fed from a channel. Used by in-memory repositories.
    pub fn from_channel(rx: mpsc::UnboundedReceiver<Delivery>) -> Self {
        let deliveries = stream::unfold(rx, |mut rx| async move {
            let delivery = rx.recv().await?;
            Some((delivery, rx))
        });
        Self::new(deliveries, || {})
    }

    /// Tear the subscription down. Idempotent.
    pub fn close(&mut self) {
        self.deliveries = None;
        if let Some(closer) = self.closer.take() {
            closer();
            debug!("Subscription closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.deliveries.is_none()
    }
}

impl Stream for Subscription {
    type Item = Delivery;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Delivery>> {
        match self.deliveries.as_mut() {
            Some(deliveries) => deliveries.poll_next_unpin(cx),
            None => Poll::Ready(None),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Store-backed repository
// ---------------------------------------------------------------------------

/// Repository over the document store's `messages` collection.
#[derive(Clone)]
pub struct StoreMessageRepository {
    database: Database,
}

impl StoreMessageRepository {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Repository over the process-wide backend app.
    pub fn from_app() -> Result<Self, StoreError> {
        Ok(Self::new(chatroom_store::app()?.database().clone()))
    }
}

impl MessageRepository for StoreMessageRepository {
    fn subscribe(&self, window: &SubscriptionWindow) -> Subscription {
        let query = Query::collection(MESSAGES_COLLECTION)
            .order_by(window.order_by, window.direction)
            .limit(window.limit);
        let (registration, snapshots) = self.database.listen(query);
        info!(limit = window.limit, "Subscribed to message tail");

        let deliveries = stream::unfold(
            (snapshots, Revisions::default()),
            |(mut snapshots, mut revisions)| async move {
                let batch = match snapshots.recv().await? {
                    Ok(snapshot) => revisions.fresh(snapshot),
                    Err(e) => {
                        warn!(error = %e, "Message listener failed");
                        vec![Delivery::Failed(ChatError::Subscription(e.to_string()))]
                    }
                };
                Some((stream::iter(batch), (snapshots, revisions)))
            },
        )
        .flatten();

        let mut registration: ListenerRegistration = registration;
        Subscription::new(deliveries, move || registration.remove())
    }

    fn append(&self, draft: Draft) -> BoxFuture<'static, Result<(), AppendError>> {
        let database = self.database.clone();
        let mut fields = WriteFields::new();
        fields.insert(FIELD_BODY.to_string(), FieldValue::string(draft.body));
        fields.insert(FIELD_USER.to_string(), FieldValue::string(draft.user));
        // The client-side placeholder never reaches the server.
        fields.insert(FIELD_TIMESTAMP.to_string(), FieldValue::ServerTimestamp);

        async move {
            let id = database
                .add(MESSAGES_COLLECTION, fields)
                .await
                .map_err(append_error)?;
            info!(id = %id, "Message appended");
            Ok(())
        }
        .boxed()
    }
}

fn append_error(error: StoreError) -> AppendError {
    match error {
        StoreError::PermissionDenied(msg) => AppendError::NotAuthorized(msg),
        StoreError::InvalidArgument(msg) => AppendError::ValidationFailed(msg),
        StoreError::Unavailable(msg) => AppendError::NetworkUnavailable(msg),
        StoreError::NotInitialized => AppendError::NetworkUnavailable(error.to_string()),
    }
}

/// Last revision delivered per document in the latest snapshot. A
/// document's revision is its timestamp; a null timestamp and its resolved
/// value are distinct. Documents that leave the window are forgotten.
#[derive(Default)]
struct Revisions {
    seen: HashMap<String, Option<chrono::DateTime<chrono::Utc>>>,
}

impl Revisions {
    fn fresh(&mut self, snapshot: QuerySnapshot) -> Vec<Delivery> {
        let mut current = HashMap::with_capacity(snapshot.docs.len());
        let mut batch = Vec::new();
        for doc in snapshot.docs {
            let Some(data) = message_data(&doc) else {
                continue;
            };
            current.insert(doc.id.clone(), data.timestamp);
            if self.seen.get(&doc.id) == Some(&data.timestamp) {
                continue;
            }
            batch.push(Delivery::Message {
                id: MessageId(doc.id),
                data,
            });
        }
        self.seen = current;
        batch
    }
}

fn message_data(doc: &DocumentSnapshot) -> Option<MessageData> {
    let Some(body) = doc.get_str(FIELD_BODY) else {
        debug!(id = %doc.id, "Skipping document without body");
        return None;
    };
    Some(MessageData {
        body: body.to_string(),
        user: doc.get_str(FIELD_USER).unwrap_or_default().to_string(),
        timestamp: doc.get_timestamp(FIELD_TIMESTAMP),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatroom_shared::Identity;
    use chatroom_store::BackendApp;
    use chatroom_shared::BackendConfig;

    fn alice() -> Identity {
        Identity::from_profile(Some("Alice"), Some("a@x"), None)
    }

    fn seed(db: &Database, id: &str, body: &str, secs: u32) {
        use chrono::TimeZone;
        let at = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, secs).unwrap();
        let mut fields = WriteFields::new();
        fields.insert("body".into(), FieldValue::string(body));
        fields.insert("user".into(), FieldValue::string("b@x"));
        fields.insert("timestamp".into(), FieldValue::timestamp(at));
        db.set("messages", id, fields).unwrap();
    }

    fn ids(deliveries: &[Delivery]) -> Vec<String> {
        deliveries
            .iter()
            .filter_map(|d| match d {
                Delivery::Message { id, .. } => Some(id.to_string()),
                Delivery::Failed(_) => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_initial_snapshot_is_window_in_backend_order() {
        let backend = BackendApp::new(BackendConfig::default());
        let db = backend.database().clone();
        for (id, secs) in [("a", 1), ("b", 2), ("c", 3)] {
            seed(&db, id, id, secs);
        }
        let repo = StoreMessageRepository::new(db);

        let mut sub = repo.subscribe(&SubscriptionWindow::tail(2));
        let first = sub.next().await.unwrap();
        let second = sub.next().await.unwrap();
        assert_eq!(ids(&[first, second]), vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_append_delivers_null_then_resolved_revision() {
        let backend = BackendApp::new(BackendConfig::default());
        let repo = StoreMessageRepository::new(backend.database().clone());
        let mut sub = repo.subscribe(&SubscriptionWindow::default());

        let draft = Draft::compose("hello", &alice()).unwrap();
        repo.append(draft).await.unwrap();

        let pending = sub.next().await.unwrap();
        let resolved = sub.next().await.unwrap();
        match (pending, resolved) {
            (
                Delivery::Message { id: a, data: pending },
                Delivery::Message { id: b, data: resolved },
            ) => {
                assert_eq!(a, b);
                assert_eq!(pending.body, "hello");
                assert_eq!(pending.user, "Alice");
                assert!(pending.timestamp.is_none());
                assert!(resolved.timestamp.is_some());
            }
            other => panic!("unexpected deliveries: {other:?}"),
        }
    }

    #[test]
    fn test_same_revision_is_delivered_once() {
        let mut revisions = Revisions::default();
        let doc = DocumentSnapshot {
            id: "m1".into(),
            fields: [
                ("body".to_string(), chatroom_store::Value::String("hi".into())),
                ("user".to_string(), chatroom_store::Value::String("b@x".into())),
                ("timestamp".to_string(), chatroom_store::Value::Null),
            ]
            .into_iter()
            .collect(),
            has_pending_writes: true,
        };
        let snapshot = QuerySnapshot { docs: vec![doc] };

        assert_eq!(revisions.fresh(snapshot.clone()).len(), 1);
        assert!(revisions.fresh(snapshot).is_empty());
    }

    fn pending(id: &str) -> DocumentSnapshot {
        DocumentSnapshot {
            id: id.into(),
            fields: [
                ("body".to_string(), chatroom_store::Value::String(id.into())),
                ("user".to_string(), chatroom_store::Value::String("b@x".into())),
                ("timestamp".to_string(), chatroom_store::Value::Null),
            ]
            .into_iter()
            .collect(),
            has_pending_writes: true,
        }
    }

    #[test]
    fn test_revisions_forget_documents_outside_latest_snapshot() {
        let mut revisions = Revisions::default();
        revisions.fresh(QuerySnapshot {
            docs: vec![pending("m1")],
        });
        let batch = revisions.fresh(QuerySnapshot {
            docs: vec![pending("m2")],
        });

        assert_eq!(ids(&batch), vec!["m2"]);
        assert_eq!(revisions.seen.len(), 1);
        assert!(revisions.seen.contains_key("m2"));

        // A document coming back into the window is delivered again.
        let batch = revisions.fresh(QuerySnapshot {
            docs: vec![pending("m1"), pending("m2")],
        });
        assert_eq!(ids(&batch), vec!["m1"]);
        assert_eq!(revisions.seen.len(), 2);
    }

    #[tokio::test]
    async fn test_append_error_mapping() {
        let backend = BackendApp::new(BackendConfig::default());
        let db = backend.database().clone();
        let repo = StoreMessageRepository::new(db.clone());
        let draft = Draft::compose("hello", &alice()).unwrap();

        db.deny_writes(true);
        assert!(matches!(
            repo.append(draft.clone()).await,
            Err(AppendError::NotAuthorized(_))
        ));

        db.deny_writes(false);
        db.set_offline(true);
        assert!(matches!(
            repo.append(draft.clone()).await,
            Err(AppendError::NetworkUnavailable(_))
        ));

        db.set_offline(false);
        let empty = Draft {
            body: String::new(),
            ..draft
        };
        assert!(matches!(
            repo.append(empty).await,
            Err(AppendError::ValidationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_listener_failure_surfaces_subscription_error() {
        let db = Database::new();
        let repo = StoreMessageRepository::new(db.clone());
        let mut sub = repo.subscribe(&SubscriptionWindow::default());

        db.fail_listeners("messages", StoreError::Unavailable("down".into()));
        assert!(matches!(
            sub.next().await,
            Some(Delivery::Failed(ChatError::Subscription(_)))
        ));
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_unregisters() {
        let db = Database::new();
        let repo = StoreMessageRepository::new(db.clone());
        let mut sub = repo.subscribe(&SubscriptionWindow::default());
        assert_eq!(db.listener_count(), 1);

        sub.close();
        sub.close();
        assert!(sub.is_closed());
        assert_eq!(db.listener_count(), 0);

        seed(&db, "late", "late", 9);
        assert!(sub.next().await.is_none());
    }
}
