//! Session driver.
//!
//! Everything that touches the view model runs on the one task executing
//! [`ChatSession::run`]: auth transitions, subscription deliveries, user
//! input and append acknowledgements are all queued and handled there in
//! turn, so the view model needs no locking.

use std::fmt;
use std::sync::Arc;

use chrono::{Local, TimeZone};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use chatroom_shared::constants::APP_TITLE;
use chatroom_shared::pages::{self, Page};
use chatroom_shared::{ChatError, SubscriptionWindow};

use crate::auth::AuthGate;
use crate::events::{ErrorChannel, ErrorNotice};
use crate::repository::MessageRepository;
use crate::view::{AccountBadge, ChatView, KeyCode, Surface};
use crate::view_model::MessageViewModel;

/// Something the user did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewInput {
    TextChanged(String),
    KeyDown(KeyCode),
    SignIn,
    SignOut,
    Navigate(String),
    Quit,
}

/// Everything the front end needs to draw one screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub title: &'static str,
    pub page: Page,
    pub badge: AccountBadge,
    /// Only the chat room page renders the message surface.
    pub surface: Option<Surface>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Frame(Frame),
    Alert(ErrorNotice),
}

pub struct ChatSession<Tz = Local> {
    gate: AuthGate,
    vm: MessageViewModel,
    view: ChatView<Tz>,
    page: Page,
    errors: mpsc::UnboundedReceiver<ChatError>,
    output: mpsc::UnboundedSender<SessionEvent>,
}

impl<Tz> ChatSession<Tz>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    /// Wire a session. `errors`/`errors_rx` must be the two halves of the
    /// channel the gate was built with.
    pub fn new(
        gate: AuthGate,
        repository: Arc<dyn MessageRepository>,
        window: SubscriptionWindow,
        view: ChatView<Tz>,
        errors: (ErrorChannel, mpsc::UnboundedReceiver<ChatError>),
        output: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let (errors, errors_rx) = errors;
        Self {
            gate,
            vm: MessageViewModel::new(repository, window, errors),
            view,
            page: pages::CHAT_ROOM,
            errors: errors_rx,
            output,
        }
    }

    pub fn view_model(&self) -> &MessageViewModel {
        &self.vm
    }

    pub fn page(&self) -> Page {
        self.page
    }

    /// Run until `Quit` arrives or the input channel closes. The message
    /// subscription is closed on return.
    ///
    /// A frame is sent first and then whenever the view model signals a
    /// change or the page switches.
    pub async fn run(&mut self, mut input: mpsc::UnboundedReceiver<ViewInput>) {
        let mut auth = self.gate.observe();
        let mut changes = self.vm.subscribe_changes();
        let mut acks: FuturesUnordered<BoxFuture<'static, ()>> = FuturesUnordered::new();

        info!(page = %self.page.path, "Chat session started");
        self.emit_frame();

        loop {
            let page = self.page;

            tokio::select! {
                biased;

                Some(state) = auth.recv() => {
                    self.vm.on_auth(state);
                }

                delivery = self.vm.next_delivery() => {
                    if let Some(delivery) = delivery {
                        self.vm.handle_delivery(delivery);
                    }
                }

                Some(()) = acks.next(), if !acks.is_empty() => {
                    debug!(in_flight = acks.len(), "Append settled");
                }

                Some(error) = self.errors.recv() => {
                    self.alert(&error);
                }

                next = input.recv() => {
                    let Some(next) = next else {
                        debug!("Input closed");
                        break;
                    };
                    if next == ViewInput::Quit {
                        break;
                    }
                    if let Some(ack) = self.on_input(next) {
                        acks.push(ack);
                    }
                }
            }

            let changed = changes.has_changed().unwrap_or(false);
            if changed || self.page != page {
                changes.borrow_and_update();
                self.emit_frame();
            }
        }

        self.vm.shutdown();
        // Appends already sent still report their outcome.
        while acks.next().await.is_some() {}
        while let Ok(error) = self.errors.try_recv() {
            self.alert(&error);
        }
        info!("Chat session ended");
    }

    fn on_input(&mut self, input: ViewInput) -> Option<BoxFuture<'static, ()>> {
        match input {
            ViewInput::TextChanged(text) => {
                self.view.on_text_change(&mut self.vm, &text);
                None
            }
            ViewInput::KeyDown(key) => {
                if !self.page.is_chat_room() {
                    debug!(page = %self.page.path, "Key ignored outside the chat room");
                    return None;
                }
                self.view.on_key_down(&mut self.vm, key)
            }
            ViewInput::SignIn => {
                if let Err(e) = self.gate.sign_in() {
                    debug!(error = %e, "Sign-in not started");
                }
                None
            }
            ViewInput::SignOut => {
                self.gate.sign_out();
                None
            }
            ViewInput::Navigate(path) => {
                match Page::from_path(&path) {
                    Some(page) => {
                        info!(path = %page.path, "Navigated");
                        self.page = page;
                    }
                    None => warn!(path = %path, "Unknown page"),
                }
                None
            }
            ViewInput::Quit => None,
        }
    }

    pub fn frame(&self) -> Frame {
        Frame {
            title: APP_TITLE,
            page: self.page,
            badge: AccountBadge::for_state(self.vm.auth()),
            surface: self
                .page
                .is_chat_room()
                .then(|| self.view.render(&self.vm)),
        }
    }

    fn emit_frame(&self) {
        if self.output.send(SessionEvent::Frame(self.frame())).is_err() {
            debug!("Front end gone, frame dropped");
        }
    }

    fn alert(&self, error: &ChatError) {
        if self
            .output
            .send(SessionEvent::Alert(ErrorNotice::from(error)))
            .is_err()
        {
            debug!("Front end gone, alert dropped");
        }
    }
}
