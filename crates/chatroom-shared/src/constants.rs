/// Application title shown in the header bar
pub const APP_TITLE: &str = "THE SIMPLEST CHAT";

/// Name of the shared chat collection in the document store
pub const MESSAGES_COLLECTION: &str = "messages";

/// Document field names of a chat message
pub const FIELD_BODY: &str = "body";
pub const FIELD_USER: &str = "user";
pub const FIELD_TIMESTAMP: &str = "timestamp";

/// Number of tail messages the chat view subscribes to
pub const DEFAULT_WINDOW: usize = 10;

/// Federated identity provider id and the scope requested on sign-in
pub const OAUTH_PROVIDER_ID: &str = "microsoft.com";
pub const OAUTH_SCOPE: &str = "user.read";

/// Display name substituted when the provider reports none
pub const UNKNOWN_DISPLAY_NAME: &str = "unknown";

/// Platform key code of the Enter key
pub const ENTER_KEY_CODE: u32 = 13;
