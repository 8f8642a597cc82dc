use serde::{Deserialize, Serialize};

use crate::constants::UNKNOWN_DISPLAY_NAME;

/// Public attributes of the signed-in user as reported by the identity
/// provider. Created on sign-in, dropped on sign-out, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub display_name: String,
    pub email: String,
    /// The current provider never supplies one.
    pub avatar_url: Option<String>,
}

impl Identity {
    /// Build an identity from the provider's optional profile fields.
    ///
    /// A missing display name becomes `"unknown"`, a missing email becomes
    /// the empty string, and an empty avatar URL counts as absent.
    pub fn from_profile(
        display_name: Option<&str>,
        email: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Self {
        Self {
            display_name: display_name
                .filter(|n| !n.is_empty())
                .unwrap_or(UNKNOWN_DISPLAY_NAME)
                .to_string(),
            email: email.unwrap_or_default().to_string(),
            avatar_url: avatar_url.filter(|u| !u.is_empty()).map(str::to_string),
        }
    }

    /// Whether a message author label belongs to this identity.
    pub fn is_author_of(&self, user: &str) -> bool {
        user == self.email
    }
}

/// Three-valued authentication state.
///
/// `Unknown` holds until the provider answers for the first time; it must
/// not be confused with `SignedOut`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", content = "identity", rename_all = "camelCase")]
pub enum AuthState {
    #[default]
    Unknown,
    SignedIn(Identity),
    SignedOut,
}

impl AuthState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            AuthState::SignedIn(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn is_signed_in(&self) -> bool {
        matches!(self, AuthState::SignedIn(_))
    }
}
