//! # chatroom-client
//!
//! The chat core (auth gate, message repository, view model and view) and
//! the terminal front end that drives it.

pub mod auth;
pub mod commands;
pub mod events;
pub mod repository;
pub mod session;
pub mod view;
pub mod view_model;

use std::io::BufRead;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use chatroom_shared::{BackendConfig, SubscriptionWindow};
use chatroom_store::ProviderUser;

use crate::auth::AuthGate;
use crate::events::ErrorChannel;
use crate::repository::StoreMessageRepository;
use crate::session::{ChatSession, SessionEvent, ViewInput};
use crate::view::ChatView;

/// Account the local identity provider signs in with.
const GUEST_UID: &str = "guest";
const GUEST_NAME_VAR: &str = "CHAT_USER_NAME";
const GUEST_EMAIL_VAR: &str = "CHAT_USER_EMAIL";

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("chatroom_client_lib=debug,chatroom_client=debug,chatroom_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

pub async fn run() -> anyhow::Result<()> {
    init_tracing();
    info!("Starting chatroom v{}", env!("CARGO_PKG_VERSION"));

    let config = BackendConfig::from_env();
    let window = SubscriptionWindow::tail(config.message_window);
    let backend = chatroom_store::initialize_app(config);

    let name = std::env::var(GUEST_NAME_VAR).ok();
    let email = std::env::var(GUEST_EMAIL_VAR).ok();
    let auth = backend.auth().clone();
    auth.set_redirect_account(Some(ProviderUser::new(
        GUEST_UID,
        name.as_deref().or(Some("Guest")),
        email.as_deref().or(Some("guest@localhost")),
    )));

    let (errors, errors_rx) = ErrorChannel::new();
    let gate = AuthGate::new(Arc::new(auth.clone()), errors.clone());
    let repository = Arc::new(StoreMessageRepository::from_app()?);

    let (output_tx, output_rx) = mpsc::unbounded_channel();
    let (input_tx, input_rx) = mpsc::unbounded_channel();

    let mut session = ChatSession::new(
        gate,
        repository,
        window,
        ChatView::local(),
        (errors, errors_rx),
        output_tx,
    );

    let printer = tokio::spawn(print_events(output_rx));
    // A plain thread so a pending read never holds up runtime shutdown.
    std::thread::spawn(move || read_stdin(input_tx));

    // No persisted session: the provider answers "signed out".
    auth.restore_session(None);
    println!("{}", commands::HELP);

    session.run(input_rx).await;
    drop(session);
    printer.await?;

    Ok(())
}

fn read_stdin(input: mpsc::UnboundedSender<ViewInput>) {
    for line in std::io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                break;
            }
        };
        match commands::parse_line(&line) {
            Ok(inputs) => {
                for next in inputs {
                    if input.send(next).is_err() {
                        return;
                    }
                }
            }
            Err(e) => eprintln!("{e}"),
        }
    }
}

async fn print_events(mut output: mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(event) = output.recv().await {
        match event {
            SessionEvent::Frame(frame) => {
                println!("== {} | {} | {}", frame.title, frame.page.name, frame.badge);
                if let Some(surface) = frame.surface {
                    print!("{surface}");
                }
            }
            SessionEvent::Alert(notice) => eprintln!("!! {notice}"),
        }
    }
}
