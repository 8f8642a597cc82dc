//! Backend configuration loaded from environment variables.
//!
//! The seven backend variables locate the hosted identity provider and
//! document store. Every field defaults to empty so the in-process
//! emulators can run with zero configuration.

use crate::constants::DEFAULT_WINDOW;

/// Settings needed to initialise the backend application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Env: `API_KEY`
    pub api_key: String,

    /// Env: `AUTH_DOMAIN`
    pub auth_domain: String,

    /// Env: `DATABASE_URL`
    pub database_url: String,

    /// Env: `PROJECT_ID`
    pub project_id: String,

    /// Env: `STORAGE_BUCKET`
    pub storage_bucket: String,

    /// Env: `MESSAGING_SENDER_ID`
    pub messaging_sender_id: String,

    /// Env: `APP_ID`
    pub app_id: String,

    /// Largest number of tail messages the chat view subscribes to.
    /// Env: `MESSAGE_WINDOW`
    /// Default: `10`
    pub message_window: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            auth_domain: String::new(),
            database_url: String::new(),
            project_id: String::new(),
            storage_bucket: String::new(),
            messaging_sender_id: String::new(),
            app_id: String::new(),
            message_window: DEFAULT_WINDOW,
        }
    }
}

impl BackendConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let fields: [(&str, &mut String); 7] = [
            ("API_KEY", &mut config.api_key),
            ("AUTH_DOMAIN", &mut config.auth_domain),
            ("DATABASE_URL", &mut config.database_url),
            ("PROJECT_ID", &mut config.project_id),
            ("STORAGE_BUCKET", &mut config.storage_bucket),
            ("MESSAGING_SENDER_ID", &mut config.messaging_sender_id),
            ("APP_ID", &mut config.app_id),
        ];
        for (key, field) in fields {
            if let Some(value) = lookup(key) {
                *field = value.trim().to_string();
            }
        }

        if let Some(val) = lookup("MESSAGE_WINDOW") {
            match val.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.message_window = n,
                _ => {
                    tracing::warn!(
                        value = %val,
                        "Invalid MESSAGE_WINDOW, using default"
                    );
                }
            }
        }

        config
    }

    /// Names of the variables a hosted backend cannot work without.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.api_key.is_empty() {
            missing.push("API_KEY");
        }
        if self.project_id.is_empty() {
            missing.push("PROJECT_ID");
        }
        missing
    }
}
