//! In-process federated identity provider.
//!
//! Mirrors the session behaviour of a hosted OAuth sign-in service: the
//! session state is reported through `on_auth_state_changed` callbacks,
//! the first report arrives only once the persisted session has been
//! restored, and sign-in completes through a redirect to the configured
//! account.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use chatroom_shared::constants::OAUTH_PROVIDER_ID;

use crate::error::{Result, StoreError};

/// Account attributes as the provider reports them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderUser {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
}

impl ProviderUser {
    pub fn new(uid: &str, display_name: Option<&str>, email: Option<&str>) -> Self {
        Self {
            uid: uid.to_string(),
            display_name: display_name.map(str::to_string),
            email: email.map(str::to_string),
            photo_url: None,
        }
    }
}

/// OAuth provider descriptor passed to a redirect sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthProvider {
    pub provider_id: String,
    pub scopes: Vec<String>,
}

impl OAuthProvider {
    pub fn new(provider_id: &str) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            scopes: Vec::new(),
        }
    }

    pub fn add_scope(&mut self, scope: &str) {
        if !self.scopes.iter().any(|s| s == scope) {
            self.scopes.push(scope.to_string());
        }
    }
}

/// Session observer. Called with `None` when no user is signed in.
pub type AuthCallback = Arc<dyn Fn(Option<ProviderUser>) + Send + Sync>;

/// Handle to the identity provider. Clones share the same session.
#[derive(Clone)]
pub struct Auth {
    inner: Arc<Mutex<AuthInner>>,
}

struct AuthInner {
    current: Option<ProviderUser>,
    /// Whether the persisted session has been restored.
    restored: bool,
    observers: Vec<AuthCallback>,
    /// Account a redirect sign-in completes with.
    redirect_account: Option<ProviderUser>,
    reachable: bool,
    reject_sign_out: bool,
    supported_providers: Vec<String>,
}

impl Default for Auth {
    fn default() -> Self {
        Self::new()
    }
}

impl Auth {
    /// A provider that has not restored its session yet.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(AuthInner {
                current: None,
                restored: false,
                observers: Vec::new(),
                redirect_account: None,
                reachable: true,
                reject_sign_out: false,
                supported_providers: vec![OAUTH_PROVIDER_ID.to_string()],
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AuthInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Finish restoring the persisted session and report it to observers.
    pub fn restore_session(&self, user: Option<ProviderUser>) {
        {
            let mut guard = self.lock();
            guard.restored = true;
            guard.current = user;
        }
        debug!("Session restored");
        self.notify();
    }

    /// Account the next redirect sign-in completes with.
    pub fn set_redirect_account(&self, user: Option<ProviderUser>) {
        self.lock().redirect_account = user;
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    pub fn reject_sign_out(&self, reject: bool) {
        self.lock().reject_sign_out = reject;
    }

    pub fn current_user(&self) -> Option<ProviderUser> {
        self.lock().current.clone()
    }

    /// Register a session observer.
    ///
    /// If the session has already been restored the observer is called
    /// immediately with the current user.
    pub fn on_auth_state_changed(&self, callback: AuthCallback) {
        let current = {
            let mut guard = self.lock();
            guard.observers.push(callback.clone());
            guard.restored.then(|| guard.current.clone())
        };
        if let Some(user) = current {
            callback(user);
        }
    }

    /// Start a redirect-based sign-in with `provider`.
    pub fn sign_in_with_redirect(&self, provider: &OAuthProvider) -> Result<()> {
        {
            let mut guard = self.lock();
            if !guard.reachable {
                return Err(StoreError::Unavailable(
                    "identity provider cannot be reached".into(),
                ));
            }
            if !guard.supported_providers.contains(&provider.provider_id) {
                return Err(StoreError::InvalidArgument(format!(
                    "unsupported provider '{}'",
                    provider.provider_id
                )));
            }
            let Some(account) = guard.redirect_account.clone() else {
                return Err(StoreError::PermissionDenied(
                    "sign-in was cancelled".into(),
                ));
            };
            info!(
                provider = %provider.provider_id,
                scopes = ?provider.scopes,
                uid = %account.uid,
                "Redirect sign-in completed"
            );
            guard.restored = true;
            guard.current = Some(account);
        }
        self.notify();
        Ok(())
    }

    pub fn sign_out(&self) -> Result<()> {
        {
            let mut guard = self.lock();
            if guard.reject_sign_out {
                warn!("Sign-out rejected by provider");
                return Err(StoreError::Unavailable("sign-out request failed".into()));
            }
            guard.current = None;
        }
        info!("Signed out");
        self.notify();
        Ok(())
    }

    // Callbacks run without the lock so they may call back into the provider.
    fn notify(&self) {
        let (observers, current) = {
            let guard = self.lock();
            (guard.observers.clone(), guard.current.clone())
        };
        for observer in observers {
            observer(current.clone());
        }
    }
}
