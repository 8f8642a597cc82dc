use thiserror::Error;

/// Errors produced by the backend services.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A backend call was made before `initialize_app`.
    #[error("Backend app has not been initialized")]
    NotInitialized,

    /// Security rules rejected the request.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The service could not be reached.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// The payload or request was malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
