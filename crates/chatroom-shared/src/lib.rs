//! # chatroom-shared
//!
//! Types shared by every chatroom crate: the message and identity model,
//! the error taxonomy surfaced to the user, backend configuration and the
//! static page table.

pub mod config;
pub mod constants;
pub mod error;
pub mod identity;
pub mod pages;
pub mod types;

pub use config::BackendConfig;
pub use error::{AppendError, ChatError};
pub use identity::{AuthState, Identity};
pub use types::{Direction, Draft, Message, MessageData, MessageId, SubscriptionWindow, Timestamp};
