use serde::Serialize;

use veil_shared::UserIdentity;

pub const EVENT_CONNECTING_STARTED: &str = "connecting-started";
pub const EVENT_CONNECTED: &str = "connected";
pub const EVENT_DISCONNECTED: &str = "disconnected";
pub const EVENT_ERROR: &str = "error";
pub const EVENT_CURRENT_USER_CHANGED: &str = "current-user-changed";
pub const EVENT_LOGGED_OUT: &str = "logged-out";
pub const EVENT_CONTACT_ADDED: &str = "contact-added";
pub const EVENT_CONTACT_ADD_FAILED: &str = "contact-add-failed";
pub const EVENT_NEW_MESSAGE: &str = "new-message";

/// Everything the session publishes to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SessionEvent {
    ConnectingStarted,
    Connected,
    Disconnected,
    Error { message: String },
    CurrentUserChanged { user: Option<UserIdentity> },
    LoggedOut,
    ContactAdded { contact: UserIdentity },
    ContactAddFailed { contact: UserIdentity, message: String },
    NewMessage { sender: UserIdentity, body: String },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectingStarted => EVENT_CONNECTING_STARTED,
            Self::Connected => EVENT_CONNECTED,
            Self::Disconnected => EVENT_DISCONNECTED,
            Self::Error { .. } => EVENT_ERROR,
            Self::CurrentUserChanged { .. } => EVENT_CURRENT_USER_CHANGED,
            Self::LoggedOut => EVENT_LOGGED_OUT,
            Self::ContactAdded { .. } => EVENT_CONTACT_ADDED,
            Self::ContactAddFailed { .. } => EVENT_CONTACT_ADD_FAILED,
            Self::NewMessage { .. } => EVENT_NEW_MESSAGE,
        }
    }
}
