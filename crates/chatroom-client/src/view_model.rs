//! Message-stream view model.
//!
//! The merge point between the auth lifecycle and the live message
//! subscription. It keeps one entry per server id, orders entries newest
//! first (id ascending on ties), bounds the rendered list to the
//! subscription window, and relays submissions to the repository.
//!
//! A message delivered before the server has resolved its timestamp is
//! stored with the local clock reading so it sorts to the top; the
//! authoritative timestamp replaces it in place when it arrives.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{self, BoxFuture};
use futures::{FutureExt, StreamExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use chatroom_shared::{
    AuthState, ChatError, Draft, Identity, Message, MessageData, MessageId, SubscriptionWindow,
};

use crate::events::ErrorChannel;
use crate::repository::{Delivery, MessageRepository, Subscription};

// ---------------------------------------------------------------------------
// MessageList
// ---------------------------------------------------------------------------

/// What happened to an incoming delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    /// A local-fallback timestamp was replaced by the server's.
    Upgraded,
    Dropped,
}

/// Id-keyed messages with a derived, bounded display order.
#[derive(Debug, Clone)]
pub struct MessageList {
    by_id: HashMap<MessageId, Message>,
    limit: usize,
}

impl MessageList {
    pub fn new(limit: usize) -> Self {
        Self {
            by_id: HashMap::new(),
            limit,
        }
    }

    pub fn merge(&mut self, id: MessageId, data: MessageData, now: DateTime<Utc>) -> MergeOutcome {
        match self.by_id.get(&id) {
            None => {
                self.by_id
                    .insert(id.clone(), Message::from_data(id, data, now));
                MergeOutcome::Inserted
            }
            Some(existing) if existing.timestamp.is_fallback() && data.timestamp.is_some() => {
                self.by_id
                    .insert(id.clone(), Message::from_data(id, data, now));
                MergeOutcome::Upgraded
            }
            Some(_) => MergeOutcome::Dropped,
        }
    }

    /// Newest first, at most `limit` entries.
    pub fn ordered(&self) -> Vec<Message> {
        let mut messages: Vec<Message> = self.by_id.values().cloned().collect();
        messages.sort_by(Message::display_order);
        messages.truncate(self.limit);
        messages
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.by_id.get(id)
    }

    /// Number of retained entries, including those beyond the window.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
    }
}

// ---------------------------------------------------------------------------
// MessageViewModel
// ---------------------------------------------------------------------------

pub struct MessageViewModel {
    repository: Arc<dyn MessageRepository>,
    window: SubscriptionWindow,
    auth: AuthState,
    messages: MessageList,
    /// Opened on sign-in. Absent while signed in only after the store has
    /// ended the stream, in which case `stale` is set.
    subscription: Option<Subscription>,
    stale: bool,
    draft: String,
    errors: ErrorChannel,
    changes: watch::Sender<u64>,
}

impl MessageViewModel {
    pub fn new(
        repository: Arc<dyn MessageRepository>,
        window: SubscriptionWindow,
        errors: ErrorChannel,
    ) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            repository,
            messages: MessageList::new(window.limit),
            window,
            auth: AuthState::Unknown,
            subscription: None,
            stale: false,
            draft: String::new(),
            errors,
            changes,
        }
    }

    // -- Reads ---------------------------------------------------------------

    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.auth.identity()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn window(&self) -> &SubscriptionWindow {
        &self.window
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Signed in, but the live subscription has ended.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// The ordered, deduplicated, bounded view of the message tail.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.ordered()
    }

    /// Whether `message` was written by the signed-in user.
    pub fn is_own(&self, message: &Message) -> bool {
        self.identity()
            .is_some_and(|identity| identity.is_author_of(&message.user))
    }

    /// Change signal. The value is a revision counter bumped on every
    /// observable mutation.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn notify(&self) {
        self.changes.send_modify(|revision| *revision += 1);
    }

    // -- Auth ----------------------------------------------------------------

    pub fn on_auth(&mut self, state: AuthState) {
        if state == self.auth {
            return;
        }

        if self.auth.is_signed_in() {
            self.tear_down();
        }

        self.auth = state;
        if let AuthState::SignedIn(identity) = &self.auth {
            info!(name = %identity.display_name, limit = self.window.limit, "Opening message subscription");
            self.messages.clear();
            self.subscription = Some(self.repository.subscribe(&self.window));
        }
        self.notify();
    }

    fn tear_down(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.close();
        }
        self.messages.clear();
        self.draft.clear();
        self.stale = false;
        debug!("Message state cleared");
    }

    /// Close the subscription for good, e.g. when the view is destroyed.
    pub fn shutdown(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.close();
        }
    }

    // -- Deliveries ----------------------------------------------------------

    /// Wait for the next subscription delivery. Pending forever while no
    /// subscription is open.
    ///
    /// Returns `None` once when the store ends the stream; the view model is
    /// then marked stale until the next sign-in.
    pub async fn next_delivery(&mut self) -> Option<Delivery> {
        let Some(subscription) = self.subscription.as_mut() else {
            return future::pending().await;
        };
        let next = subscription.next().await;
        if next.is_none() {
            warn!("Message subscription ended, live updates stopped");
            self.subscription = None;
            self.stale = true;
            self.notify();
        }
        next
    }

    pub fn handle_delivery(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Message { id, data } => {
                self.on_incoming(id, data);
            }
            Delivery::Failed(error) => {
                warn!(error = %error, "Subscription error, keeping current snapshot");
                self.errors.report(error);
            }
        }
    }

    /// Merge one delivery. Returns whether the snapshot changed.
    pub fn on_incoming(&mut self, id: MessageId, data: MessageData) -> bool {
        if !self.auth.is_signed_in() {
            debug!(id = %id, "Delivery while signed out, ignored");
            return false;
        }

        let outcome = self.messages.merge(id.clone(), data, Utc::now());
        debug!(id = %id, ?outcome, "Delivery merged");
        match outcome {
            MergeOutcome::Inserted | MergeOutcome::Upgraded => {
                self.notify();
                true
            }
            MergeOutcome::Dropped => false,
        }
    }

    // -- Input ---------------------------------------------------------------

    pub fn on_draft_change(&mut self, text: &str) {
        if self.draft != text {
            self.draft = text.to_string();
            self.notify();
        }
    }

    /// Send the draft. Returns `None` (and does nothing) unless signed in
    /// with a non-empty draft.
    ///
    /// The returned future resolves when the server acknowledges the write;
    /// a failure is reported on the error channel. The draft is cleared
    /// before the acknowledgement and is not restored on failure.
    pub fn submit(&mut self) -> Option<BoxFuture<'static, ()>> {
        let identity = self.auth.identity()?;
        let draft = Draft::compose(&self.draft, identity)?;

        let ack = self.repository.append(draft);
        self.draft.clear();
        self.notify();

        let errors = self.errors.clone();
        Some(
            async move {
                match ack.await {
                    Ok(()) => debug!("Append acknowledged"),
                    Err(e) => errors.report(ChatError::Append(e)),
                }
            }
            .boxed(),
        )
    }
}

impl Drop for MessageViewModel {
    fn drop(&mut self) {
        self.shutdown();
    }
}
