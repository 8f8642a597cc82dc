use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use chatroom_shared::{AppendError, ChatError};

pub const ERROR_AUTH_PROVIDER_UNAVAILABLE: &str = "auth-provider-unavailable";
pub const ERROR_SIGN_OUT_FAILED: &str = "sign-out-failed";
pub const ERROR_SUBSCRIPTION: &str = "subscription-error";
pub const ERROR_NOT_AUTHORIZED: &str = "append-not-authorized";
pub const ERROR_NETWORK_UNAVAILABLE: &str = "append-network-unavailable";
pub const ERROR_VALIDATION_FAILED: &str = "append-validation-failed";

/// User-facing form of a [`ChatError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorNotice {
    pub kind: &'static str,
    pub message: String,
}

impl From<&ChatError> for ErrorNotice {
    fn from(error: &ChatError) -> Self {
        let kind = match error {
            ChatError::AuthProviderUnavailable(_) => ERROR_AUTH_PROVIDER_UNAVAILABLE,
            ChatError::SignOutFailed(_) => ERROR_SIGN_OUT_FAILED,
            ChatError::Subscription(_) => ERROR_SUBSCRIPTION,
            ChatError::Append(AppendError::NotAuthorized(_)) => ERROR_NOT_AUTHORIZED,
            ChatError::Append(AppendError::NetworkUnavailable(_)) => ERROR_NETWORK_UNAVAILABLE,
            ChatError::Append(AppendError::ValidationFailed(_)) => ERROR_VALIDATION_FAILED,
        };
        Self {
            kind,
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for ErrorNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// The single channel every failure is surfaced through.
#[derive(Debug, Clone)]
pub struct ErrorChannel {
    tx: mpsc::UnboundedSender<ChatError>,
}

impl ErrorChannel {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChatError>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn report(&self, error: ChatError) {
        warn!(error = %error, "Surfacing error");
        if self.tx.send(error).is_err() {
            debug!("Error channel closed, notice dropped");
        }
    }
}
