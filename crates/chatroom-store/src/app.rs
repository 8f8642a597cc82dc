//! Process-wide backend application handle.
//!
//! [`initialize_app`] must run once before any repository call. The handle
//! lives for the rest of the process; there is no teardown.

use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use chatroom_shared::constants::{FIELD_BODY, MESSAGES_COLLECTION};
use chatroom_shared::BackendConfig;

use crate::auth::Auth;
use crate::database::Database;
use crate::error::{Result, StoreError};

static APP: OnceCell<BackendApp> = OnceCell::new();

/// The initialised backend: configuration plus the services it locates.
pub struct BackendApp {
    config: BackendConfig,
    database: Database,
    auth: Auth,
}

impl BackendApp {
    /// Build a backend with the chat collection's schema rules installed.
    pub fn new(config: BackendConfig) -> Self {
        let database = Database::new();
        database.require_non_empty(MESSAGES_COLLECTION, FIELD_BODY);
        Self {
            config,
            database,
            auth: Auth::new(),
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }
}

/// Initialise the process-wide backend. A second call returns the handle
/// created by the first one and ignores `config`.
pub fn initialize_app(config: BackendConfig) -> &'static BackendApp {
    if let Some(existing) = APP.get() {
        debug!("Backend app already initialized");
        return existing;
    }

    let missing = config.missing_required();
    if !missing.is_empty() {
        warn!(?missing, "Backend configuration incomplete, using local services");
    }

    APP.get_or_init(|| {
        info!(
            project = %config.project_id,
            auth_domain = %config.auth_domain,
            window = config.message_window,
            "Initializing backend app"
        );
        BackendApp::new(config)
    })
}

/// The process-wide backend, or `NotInitialized` before [`initialize_app`].
pub fn app() -> Result<&'static BackendApp> {
    APP.get().ok_or(StoreError::NotInitialized)
}
