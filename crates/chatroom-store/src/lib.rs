//! # chatroom-store
//!
//! The backend side of the chat room: an in-process stand-in for the hosted
//! document database and the federated identity provider, plus the
//! process-wide [`BackendApp`] handle that owns both.
//!
//! The document store keeps named collections of documents, resolves the
//! server-timestamp sentinel on commit, and pushes full query snapshots to
//! live listeners after every change.

pub mod app;
pub mod auth;
pub mod database;
pub mod models;

mod error;

pub use app::{app, initialize_app, BackendApp};
pub use auth::{Auth, AuthCallback, OAuthProvider, ProviderUser};
pub use database::{Database, ListenerRegistration};
pub use error::{Result, StoreError};
pub use models::*;
