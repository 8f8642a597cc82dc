//! Authentication gate.
//!
//! Converts the identity provider's session callbacks into the
//! three-valued [`AuthState`] and fans every transition out to listeners.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tracing::{debug, info};

use chatroom_shared::constants::{OAUTH_PROVIDER_ID, OAUTH_SCOPE};
use chatroom_shared::{AuthState, ChatError, Identity};
use chatroom_store::{Auth, AuthCallback, OAuthProvider, ProviderUser, StoreError};

use crate::events::ErrorChannel;

/// The identity-provider operations the gate relies on.
pub trait IdentityProvider: Send + Sync + 'static {
    fn on_auth_state_changed(&self, callback: AuthCallback);
    fn sign_in_with_redirect(&self, provider: &OAuthProvider) -> Result<(), StoreError>;
    fn sign_out(&self) -> Result<(), StoreError>;
}

impl IdentityProvider for Auth {
    fn on_auth_state_changed(&self, callback: AuthCallback) {
        Auth::on_auth_state_changed(self, callback)
    }

    fn sign_in_with_redirect(&self, provider: &OAuthProvider) -> Result<(), StoreError> {
        Auth::sign_in_with_redirect(self, provider)
    }

    fn sign_out(&self) -> Result<(), StoreError> {
        Auth::sign_out(self)
    }
}

#[derive(Clone)]
pub struct AuthGate {
    provider: Arc<dyn IdentityProvider>,
    shared: Arc<Mutex<GateState>>,
    errors: ErrorChannel,
}

struct GateState {
    current: AuthState,
    listeners: Vec<mpsc::UnboundedSender<AuthState>>,
}

impl AuthGate {
    /// Attach a gate to `provider`. The state stays `Unknown` until the
    /// provider's first callback.
    pub fn new(provider: Arc<dyn IdentityProvider>, errors: ErrorChannel) -> Self {
        let shared = Arc::new(Mutex::new(GateState {
            current: AuthState::Unknown,
            listeners: Vec::new(),
        }));

        let weak: Weak<Mutex<GateState>> = Arc::downgrade(&shared);
        provider.on_auth_state_changed(Arc::new(move |user: Option<ProviderUser>| {
            if let Some(shared) = weak.upgrade() {
                publish(&shared, state_from_user(user));
            }
        }));

        Self {
            provider,
            shared,
            errors,
        }
    }

    /// Register a listener. It immediately receives the current state and
    /// then every later transition.
    pub fn observe(&self) -> mpsc::UnboundedReceiver<AuthState> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut guard = lock(&self.shared);
        let _ = tx.send(guard.current.clone());
        guard.listeners.push(tx);
        rx
    }

    pub fn current(&self) -> AuthState {
        lock(&self.shared).current.clone()
    }

    /// Start the redirect sign-in. The outcome arrives through `observe`.
    pub fn sign_in(&self) -> Result<(), ChatError> {
        let mut provider = OAuthProvider::new(OAUTH_PROVIDER_ID);
        provider.add_scope(OAUTH_SCOPE);

        self.provider.sign_in_with_redirect(&provider).map_err(|e| {
            let error = ChatError::AuthProviderUnavailable(e.to_string());
            self.errors.report(error.clone());
            error
        })
    }

    /// Request session termination. A rejected request still moves the gate
    /// to `SignedOut` and is reported as `SignOutFailed`.
    pub fn sign_out(&self) {
        if let Err(e) = self.provider.sign_out() {
            publish(&self.shared, AuthState::SignedOut);
            self.errors.report(ChatError::SignOutFailed(e.to_string()));
        }
    }
}

fn lock(shared: &Mutex<GateState>) -> MutexGuard<'_, GateState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

fn state_from_user(user: Option<ProviderUser>) -> AuthState {
    match user {
        Some(user) => AuthState::SignedIn(Identity::from_profile(
            user.display_name.as_deref(),
            user.email.as_deref(),
            user.photo_url.as_deref(),
        )),
        None => AuthState::SignedOut,
    }
}

fn publish(shared: &Mutex<GateState>, state: AuthState) {
    let mut guard = lock(shared);
    if guard.current == state {
        debug!(?state, "Auth state unchanged");
        return;
    }

    match &state {
        AuthState::SignedIn(identity) => {
            info!(name = %identity.display_name, email = %identity.email, "Signed in")
        }
        AuthState::SignedOut => info!("Signed out"),
        AuthState::Unknown => {}
    }

    guard.current = state.clone();
    guard.listeners.retain(|tx| tx.send(state.clone()).is_ok());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> ProviderUser {
        ProviderUser::new("u1", Some("Alice"), Some("a@x"))
    }

    fn gate_with(auth: &Auth) -> (AuthGate, mpsc::UnboundedReceiver<ChatError>) {
        let (errors, errors_rx) = ErrorChannel::new();
        (AuthGate::new(Arc::new(auth.clone()), errors), errors_rx)
    }

    #[test]
    fn test_unknown_until_provider_answers() {
        let auth = Auth::new();
        let (gate, _errors) = gate_with(&auth);
        let mut rx = gate.observe();

        assert_eq!(rx.try_recv().unwrap(), AuthState::Unknown);
        assert!(rx.try_recv().is_err());

        auth.restore_session(None);
        assert_eq!(rx.try_recv().unwrap(), AuthState::SignedOut);
        assert_eq!(gate.current(), AuthState::SignedOut);
    }

    #[test]
    fn test_restored_session_maps_identity() {
        let auth = Auth::new();
        auth.restore_session(Some(ProviderUser::new("u1", None, None)));
        let (gate, _errors) = gate_with(&auth);

        let expected = AuthState::SignedIn(Identity {
            display_name: "unknown".into(),
            email: String::new(),
            avatar_url: None,
        });
        assert_eq!(gate.current(), expected);
        assert_eq!(gate.observe().try_recv().unwrap(), expected);
    }

    #[test]
    fn test_sign_in_then_out() {
        let auth = Auth::new();
        auth.restore_session(None);
        auth.set_redirect_account(Some(alice()));
        let (gate, _errors) = gate_with(&auth);
        let mut rx = gate.observe();

        gate.sign_in().unwrap();
        gate.sign_out();

        assert_eq!(rx.try_recv().unwrap(), AuthState::SignedOut);
        match rx.try_recv().unwrap() {
            AuthState::SignedIn(identity) => {
                assert_eq!(identity.display_name, "Alice");
                assert_eq!(identity.email, "a@x");
            }
            other => panic!("expected SignedIn, got {other:?}"),
        }
        assert_eq!(rx.try_recv().unwrap(), AuthState::SignedOut);
    }

    #[test]
    fn test_sign_in_unreachable_reports_error() {
        let auth = Auth::new();
        auth.restore_session(None);
        auth.set_reachable(false);
        let (gate, mut errors) = gate_with(&auth);

        let err = gate.sign_in().unwrap_err();
        assert!(matches!(err, ChatError::AuthProviderUnavailable(_)));
        assert!(matches!(
            errors.try_recv().unwrap(),
            ChatError::AuthProviderUnavailable(_)
        ));
        assert_eq!(gate.current(), AuthState::SignedOut);
    }

    #[test]
    fn test_rejected_sign_out_still_signs_out_locally() {
        let auth = Auth::new();
        auth.restore_session(Some(alice()));
        auth.reject_sign_out(true);
        let (gate, mut errors) = gate_with(&auth);
        assert!(gate.current().is_signed_in());

        gate.sign_out();
        assert_eq!(gate.current(), AuthState::SignedOut);
        assert!(matches!(
            errors.try_recv().unwrap(),
            ChatError::SignOutFailed(_)
        ));
    }
}
