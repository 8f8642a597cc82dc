//! End-to-end chat flows against the in-process identity provider and
//! document store.

use std::sync::Arc;

use chrono::{FixedOffset, TimeZone, Utc};
use tokio::sync::mpsc;

use chatroom_client_lib::auth::AuthGate;
use chatroom_client_lib::events::ErrorChannel;
use chatroom_client_lib::repository::StoreMessageRepository;
use chatroom_client_lib::view::{ChatView, KeyCode, Side, Surface};
use chatroom_client_lib::view_model::MessageViewModel;
use chatroom_shared::{AuthState, BackendConfig, ChatError, SubscriptionWindow, Timestamp};
use chatroom_store::{Auth, BackendApp, Database, FieldValue, ProviderUser, WriteFields};

struct Chat {
    backend: BackendApp,
    gate: AuthGate,
    auth_rx: mpsc::UnboundedReceiver<AuthState>,
    errors_rx: mpsc::UnboundedReceiver<ChatError>,
    vm: MessageViewModel,
    view: ChatView<FixedOffset>,
}

impl Chat {
    fn new() -> Self {
        let backend = BackendApp::new(BackendConfig::default());
        backend
            .auth()
            .set_redirect_account(Some(ProviderUser::new("u1", Some("Alice"), Some("a@x"))));
        let (errors, errors_rx) = ErrorChannel::new();
        let gate = AuthGate::new(Arc::new(backend.auth().clone()), errors.clone());
        let auth_rx = gate.observe();
        let vm = MessageViewModel::new(
            Arc::new(StoreMessageRepository::new(backend.database().clone())),
            SubscriptionWindow::default(),
            errors,
        );
        Self {
            backend,
            gate,
            auth_rx,
            errors_rx,
            vm,
            view: ChatView::new(FixedOffset::east_opt(0).unwrap()),
        }
    }

    fn auth(&self) -> &Auth {
        self.backend.auth()
    }

    fn database(&self) -> &Database {
        self.backend.database()
    }

    /// Apply every queued auth transition.
    fn pump_auth(&mut self) {
        while let Ok(state) = self.auth_rx.try_recv() {
            self.vm.on_auth(state);
        }
    }

    /// Apply the next `n` subscription deliveries.
    async fn pump_deliveries(&mut self, n: usize) {
        for _ in 0..n {
            let delivery = self.vm.next_delivery().await.expect("subscription ended");
            self.vm.handle_delivery(delivery);
        }
    }

    fn ids(&self) -> Vec<String> {
        self.vm.snapshot().into_iter().map(|m| m.id.0).collect()
    }
}

fn seed(db: &Database, id: &str, body: &str, user: &str, secs: u32) {
    let mut fields = WriteFields::new();
    fields.insert("body".into(), FieldValue::string(body));
    fields.insert("user".into(), FieldValue::string(user));
    fields.insert(
        "timestamp".into(),
        FieldValue::timestamp(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, secs).unwrap()),
    );
    db.set("messages", id, fields).unwrap();
}

#[tokio::test]
async fn test_cold_start_signed_out() {
    let mut chat = Chat::new();
    chat.pump_auth();
    assert_eq!(chat.view.render(&chat.vm), Surface::Progress);

    chat.auth().restore_session(None);
    chat.pump_auth();

    assert_eq!(chat.view.render(&chat.vm), Surface::SignInRequired);
    assert!(chat.vm.snapshot().is_empty());
    chat.vm.on_draft_change("hello");
    assert!(chat.vm.submit().is_none());
    assert!(chat.database().query(&chatroom_store::Query::collection("messages")).docs.is_empty());
}

#[tokio::test]
async fn test_sign_in_then_initial_fetch() {
    let mut chat = Chat::new();
    seed(chat.database(), "m1", "hi", "b@x", 2);
    seed(chat.database(), "m2", "yo", "a@x", 1);
    chat.auth().restore_session(None);

    chat.gate.sign_in().unwrap();
    chat.pump_auth();
    chat.pump_deliveries(2).await;

    assert_eq!(chat.ids(), vec!["m1", "m2"]);
    let Surface::ChatRoom { greeting, rows, .. } = chat.view.render(&chat.vm) else {
        panic!("expected the chat room");
    };
    assert_eq!(greeting, "ようこそAliceさん！");
    assert_eq!(rows[0].side, Side::Other);
    assert_eq!(rows[1].side, Side::Own);
    assert_eq!(rows[0].time, "2024年01月01日 00:00:02");
}

#[tokio::test]
async fn test_append_with_sentinel_resolution() {
    let mut chat = Chat::new();
    seed(chat.database(), "m1", "hi", "b@x", 2);
    chat.database().hold_server_timestamps(true);
    chat.auth().restore_session(Some(ProviderUser::new("u1", Some("Alice"), Some("a@x"))));
    chat.pump_auth();
    chat.pump_deliveries(1).await;

    chat.view.on_text_change(&mut chat.vm, "hello");
    let ack = chat.view.on_key_down(&mut chat.vm, KeyCode::ENTER).unwrap();
    assert_eq!(chat.vm.draft(), "");
    ack.await;

    chat.pump_deliveries(1).await;
    let top = chat.vm.snapshot()[0].clone();
    assert_eq!(top.body, "hello");
    assert_eq!(top.user, "Alice");
    assert!(top.timestamp.is_fallback());

    assert_eq!(chat.database().resolve_server_timestamps(), 1);
    chat.pump_deliveries(1).await;

    let snapshot = chat.vm.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].id, top.id);
    assert!(matches!(snapshot[0].timestamp, Timestamp::Server(_)));
}

#[tokio::test]
async fn test_sign_out_clears_and_closes_listener() {
    let mut chat = Chat::new();
    seed(chat.database(), "m1", "hi", "b@x", 2);
    chat.auth().restore_session(Some(ProviderUser::new("u1", Some("Alice"), Some("a@x"))));
    chat.pump_auth();
    chat.pump_deliveries(1).await;
    assert_eq!(chat.database().listener_count(), 1);

    chat.gate.sign_out();
    chat.pump_auth();
    assert!(chat.vm.snapshot().is_empty());
    assert_eq!(chat.database().listener_count(), 0);

    seed(chat.database(), "m4", "late", "b@x", 4);
    assert!(chat.vm.snapshot().is_empty());
    assert_eq!(chat.view.render(&chat.vm), Surface::SignInRequired);
}

#[tokio::test]
async fn test_rejected_write_is_surfaced() {
    let mut chat = Chat::new();
    chat.auth().restore_session(Some(ProviderUser::new("u1", Some("Alice"), Some("a@x"))));
    chat.pump_auth();
    chat.database().deny_writes(true);

    chat.vm.on_draft_change("hello");
    chat.vm.submit().unwrap().await;

    assert!(matches!(
        chat.errors_rx.try_recv().unwrap(),
        ChatError::Append(chatroom_shared::AppendError::NotAuthorized(_))
    ));
    assert_eq!(chat.vm.draft(), "");
}

#[tokio::test]
async fn test_subscription_failure_keeps_snapshot() {
    let mut chat = Chat::new();
    seed(chat.database(), "m1", "hi", "b@x", 2);
    chat.auth().restore_session(Some(ProviderUser::new("u1", Some("Alice"), Some("a@x"))));
    chat.pump_auth();
    chat.pump_deliveries(1).await;

    chat.database()
        .fail_listeners("messages", chatroom_store::StoreError::Unavailable("lost".into()));
    chat.pump_deliveries(1).await;

    assert_eq!(chat.ids(), vec!["m1"]);
    assert!(matches!(
        chat.errors_rx.try_recv().unwrap(),
        ChatError::Subscription(_)
    ));

    assert!(chat.vm.next_delivery().await.is_none());
    assert!(chat.vm.is_stale());
    let Surface::ChatRoom { stale, rows, .. } = chat.view.render(&chat.vm) else {
        panic!("expected the chat room");
    };
    assert!(stale);
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn test_unreachable_provider() {
    let mut chat = Chat::new();
    chat.auth().restore_session(None);
    chat.auth().set_reachable(false);

    assert!(chat.gate.sign_in().is_err());
    chat.pump_auth();
    assert_eq!(chat.vm.auth(), &AuthState::SignedOut);
    assert!(matches!(
        chat.errors_rx.try_recv().unwrap(),
        ChatError::AuthProviderUnavailable(_)
    ));
}
