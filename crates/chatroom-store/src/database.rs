//! Document database connection management.
//!
//! The [`Database`] struct is a cheap, cloneable handle to an in-process
//! document store. It mirrors the observable behaviour of the hosted
//! service the chat room talks to:
//!
//! - writes carrying [`FieldValue::ServerTimestamp`] are first visible with a
//!   `null` field (latency compensation) and resolved on commit;
//! - live listeners receive a full [`QuerySnapshot`] on registration and
//!   after every change to their collection;
//! - write rules can deny writes, take the service offline, or require
//!   non-empty string fields.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use chatroom_shared::types::Direction;

use crate::error::{Result, StoreError};
use crate::models::{DocumentSnapshot, FieldValue, Fields, Query, QuerySnapshot, Value, WriteFields};

type SnapshotSender = mpsc::UnboundedSender<Result<QuerySnapshot>>;

/// Handle to the document store. Clones share the same data.
#[derive(Clone, Default)]
pub struct Database {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<String, StoredDocument>>,
    listeners: Vec<ListenerSlot>,
    next_listener_id: u64,
    rules: WriteRules,
    hold_server_timestamps: bool,
}

struct StoredDocument {
    fields: Fields,
    /// Fields written with the server-timestamp sentinel, not yet committed.
    pending: Vec<String>,
}

struct ListenerSlot {
    id: u64,
    query: Query,
    tx: SnapshotSender,
}

#[derive(Debug, Clone, Default)]
struct WriteRules {
    deny_writes: bool,
    offline: bool,
    /// `(collection, field)` pairs that must hold a non-empty string.
    non_empty: Vec<(String, String)>,
}

impl Database {
    /// Create an empty store with no write rules.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -- Rules ---------------------------------------------------------------

    /// Reject writes to `collection` whose `field` is missing or empty.
    pub fn require_non_empty(&self, collection: &str, field: &str) {
        self.lock()
            .rules
            .non_empty
            .push((collection.to_string(), field.to_string()));
    }

    /// Make every write fail with `PermissionDenied`.
    pub fn deny_writes(&self, deny: bool) {
        self.lock().rules.deny_writes = deny;
    }

    /// Make every write fail with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.lock().rules.offline = offline;
    }

    /// Keep server timestamps pending until [`Database::resolve_server_timestamps`].
    pub fn hold_server_timestamps(&self, hold: bool) {
        self.lock().hold_server_timestamps = hold;
    }

    // -- Writes --------------------------------------------------------------

    /// Add a document with a server-assigned id.
    ///
    /// Completes once the write is committed, i.e. after the server
    /// timestamps in `fields` have been resolved (unless they are held).
    pub async fn add(&self, collection: &str, fields: WriteFields) -> Result<String> {
        let id = Uuid::new_v4().simple().to_string();
        let pending = self.write(collection, &id, fields)?;

        if pending {
            // Listeners see the uncommitted document before the commit lands.
            tokio::task::yield_now().await;
            if !self.lock().hold_server_timestamps {
                self.commit(collection, &id);
            }
        }

        info!(collection, id = %id, "Document added");
        Ok(id)
    }

    /// Create or overwrite a document under a caller-chosen id.
    pub fn set(&self, collection: &str, id: &str, fields: WriteFields) -> Result<()> {
        let pending = self.write(collection, id, fields)?;
        if pending && !self.lock().hold_server_timestamps {
            self.commit(collection, id);
        }
        Ok(())
    }

    /// Resolve every held server timestamp to the current instant.
    ///
    /// Returns the number of documents committed.
    pub fn resolve_server_timestamps(&self) -> usize {
        let mut guard = self.lock();
        let now = Utc::now();
        let mut touched: Vec<String> = Vec::new();

        for (name, docs) in guard.collections.iter_mut() {
            for doc in docs.values_mut().filter(|d| !d.pending.is_empty()) {
                for field in doc.pending.drain(..) {
                    doc.fields.insert(field, Value::Timestamp(now));
                }
                touched.push(name.clone());
            }
        }

        let count = touched.len();
        touched.sort();
        touched.dedup();
        for name in &touched {
            notify(&mut guard, name);
        }
        debug!(count, "Resolved held server timestamps");
        count
    }

    /// Validate and store `fields`, leaving sentinels pending. Returns
    /// whether any sentinel was written.
    fn write(&self, collection: &str, id: &str, fields: WriteFields) -> Result<bool> {
        let mut guard = self.lock();
        check_rules(&guard.rules, collection, &fields)?;

        let mut stored = Fields::new();
        let mut pending = Vec::new();
        for (name, value) in fields {
            match value {
                FieldValue::Set(v) => {
                    stored.insert(name, v);
                }
                FieldValue::ServerTimestamp => {
                    stored.insert(name.clone(), Value::Null);
                    pending.push(name);
                }
            }
        }

        let has_pending = !pending.is_empty();
        guard
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(
                id.to_string(),
                StoredDocument {
                    fields: stored,
                    pending,
                },
            );
        notify(&mut guard, collection);
        Ok(has_pending)
    }

    fn commit(&self, collection: &str, id: &str) {
        let mut guard = self.lock();
        let now = Utc::now();
        let Some(doc) = guard
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
        else {
            return;
        };
        if doc.pending.is_empty() {
            return;
        }
        for field in doc.pending.drain(..) {
            doc.fields.insert(field, Value::Timestamp(now));
        }
        notify(&mut guard, collection);
    }

    // -- Reads ---------------------------------------------------------------

    pub fn get(&self, collection: &str, id: &str) -> Option<DocumentSnapshot> {
        let guard = self.lock();
        guard
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|doc| doc.snapshot(id))
    }

    /// One-shot evaluation of `query`.
    pub fn query(&self, query: &Query) -> QuerySnapshot {
        let guard = self.lock();
        run_query(&guard, query)
    }

    /// Register a live listener on `query`.
    ///
    /// The receiver yields the current result immediately and a fresh
    /// snapshot after every change to the collection. A listener that
    /// receives an error is terminated by the store.
    pub fn listen(
        &self,
        query: Query,
    ) -> (ListenerRegistration, mpsc::UnboundedReceiver<Result<QuerySnapshot>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut guard = self.lock();

        let id = guard.next_listener_id;
        guard.next_listener_id += 1;

        let _ = tx.send(Ok(run_query(&guard, &query)));
        debug!(listener = id, collection = %query.collection, "Listener registered");
        guard.listeners.push(ListenerSlot { id, query, tx });

        let registration = ListenerRegistration {
            id,
            inner: Arc::downgrade(&self.inner),
            removed: false,
        };
        (registration, rx)
    }

    /// Deliver `error` to every listener on `collection` and drop them.
    ///
    /// Returns the number of listeners terminated.
    pub fn fail_listeners(&self, collection: &str, error: StoreError) -> usize {
        let mut guard = self.lock();
        let before = guard.listeners.len();
        guard.listeners.retain(|slot| {
            if slot.query.collection != collection {
                return true;
            }
            let _ = slot.tx.send(Err(error.clone()));
            false
        });
        let failed = before - guard.listeners.len();
        warn!(collection, failed, error = %error, "Terminated listeners");
        failed
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }
}

/// Handle returned by [`Database::listen`]. Removing it (explicitly or by
/// dropping) stops further snapshots.
pub struct ListenerRegistration {
    id: u64,
    inner: Weak<Mutex<Inner>>,
    removed: bool,
}

impl ListenerRegistration {
    /// Unregister the listener. Calling it again is a no-op.
    pub fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        if let Some(inner) = self.inner.upgrade() {
            let mut guard = inner.lock().unwrap_or_else(PoisonError::into_inner);
            guard.listeners.retain(|slot| slot.id != self.id);
            debug!(listener = self.id, "Listener removed");
        }
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.remove();
    }
}

impl StoredDocument {
    fn snapshot(&self, id: &str) -> DocumentSnapshot {
        DocumentSnapshot {
            id: id.to_string(),
            fields: self.fields.clone(),
            has_pending_writes: !self.pending.is_empty(),
        }
    }

    fn order_key(&self, field: &str) -> Option<OrderKey> {
        if self.pending.iter().any(|f| f == field) {
            return Some(OrderKey::Pending);
        }
        self.fields.get(field).map(|value| match value {
            Value::Null => OrderKey::Null,
            Value::String(s) => OrderKey::String(s.clone()),
            Value::Timestamp(at) => OrderKey::Timestamp(*at),
        })
    }
}

/// Sort key of a field. Variant order is the cross-type order; a pending
/// server timestamp sorts after every resolved one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum OrderKey {
    Null,
    String(String),
    Timestamp(DateTime<Utc>),
    Pending,
}

fn check_rules(rules: &WriteRules, collection: &str, fields: &WriteFields) -> Result<()> {
    if rules.offline {
        return Err(StoreError::Unavailable("client is offline".into()));
    }
    if rules.deny_writes {
        return Err(StoreError::PermissionDenied(format!(
            "writes to '{collection}' are not allowed"
        )));
    }
    for (rule_collection, field) in &rules.non_empty {
        if rule_collection != collection {
            continue;
        }
        match fields.get(field) {
            Some(FieldValue::Set(Value::String(s))) if !s.is_empty() => {}
            _ => {
                return Err(StoreError::InvalidArgument(format!(
                    "field '{field}' must be a non-empty string"
                )))
            }
        }
    }
    Ok(())
}

fn run_query(inner: &Inner, query: &Query) -> QuerySnapshot {
    let Some(docs) = inner.collections.get(&query.collection) else {
        return QuerySnapshot::default();
    };

    let mut rows: Vec<(Option<OrderKey>, &String, &StoredDocument)> = docs
        .iter()
        .map(|(id, doc)| {
            let key = query
                .order_by
                .as_ref()
                .and_then(|(field, _)| doc.order_key(field));
            (key, id, doc)
        })
        // Ordering on a field excludes documents that lack it.
        .filter(|(key, _, _)| query.order_by.is_none() || key.is_some())
        .collect();

    if let Some((_, direction)) = &query.order_by {
        rows.sort_by(|a, b| {
            let ord = a.0.cmp(&b.0);
            let ord = match direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            };
            ord.then_with(|| a.1.cmp(&b.1))
        });
    }

    let limit = query.limit.unwrap_or(usize::MAX);
    QuerySnapshot {
        docs: rows
            .into_iter()
            .take(limit)
            .map(|(_, id, doc)| doc.snapshot(id))
            .collect(),
    }
}

fn notify(inner: &mut Inner, collection: &str) {
    let view: &Inner = inner;
    let snapshots: Vec<(u64, QuerySnapshot)> = view
        .listeners
        .iter()
        .filter(|slot| slot.query.collection == collection)
        .map(|slot| (slot.id, run_query(view, &slot.query)))
        .collect();

    for (id, snapshot) in snapshots {
        if let Some(slot) = inner.listeners.iter().find(|slot| slot.id == id) {
            if slot.tx.send(Ok(snapshot)).is_err() {
                debug!(listener = id, "Listener receiver dropped");
            }
        }
    }
    inner.listeners.retain(|slot| !slot.tx.is_closed());
}
