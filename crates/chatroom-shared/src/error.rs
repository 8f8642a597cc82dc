use thiserror::Error;

/// Every failure the chat surface can show to the user.
///
/// None of these are fatal: they are reported on the error channel and the
/// session keeps servicing events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("Sign-in could not be started: {0}")]
    AuthProviderUnavailable(String),

    #[error("Sign-out was rejected: {0}")]
    SignOutFailed(String),

    #[error("Message subscription failed: {0}")]
    Subscription(String),

    #[error("Message could not be sent: {0}")]
    Append(#[from] AppendError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppendError {
    #[error("not authorized to write: {0}")]
    NotAuthorized(String),

    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("rejected by server: {0}")]
    ValidationFailed(String),
}
