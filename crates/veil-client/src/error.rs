use thiserror::Error;

use veil_net::TransportError;
use veil_shared::UserIdentity;
use veil_store::StoreError;

use crate::identity::IdentityServiceError;

/// How the session controller recovers from a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The local store is unusable; the process must not proceed.
    Fatal,
    /// Report to the user, then force a full logout.
    RecoverableLogout,
    /// Log and drop; no event, no state change.
    SilentDiscard,
    /// Report to the user; session state is untouched.
    Informational,
    /// The request itself was refused and nothing happened.
    Rejected,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Cannot initialize identity service: {0}")]
    IdentityInit(IdentityServiceError),

    #[error("Cannot load user credentials")]
    MissingCredentials(UserIdentity),

    #[error("Cannot Sign In user: {0}")]
    SignIn(IdentityServiceError),

    #[error("Cannot Sign Up user: {0}")]
    SignUp(IdentityServiceError),

    #[error("Cannot get transport password: {0}")]
    TransportPassword(IdentityServiceError),

    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("Cannot encrypt message for {recipient}: {source}")]
    Encrypt {
        recipient: UserIdentity,
        source: IdentityServiceError,
    },

    #[error("Cannot decrypt message from {sender}: {source}")]
    Decrypt {
        sender: UserIdentity,
        source: IdentityServiceError,
    },

    #[error("Malformed message from {sender}: {reason}")]
    MalformedMessage { sender: UserIdentity, reason: String },

    #[error("Message origin has no user part: {0}")]
    MissingSender(String),

    #[error("User is not registered : {0}")]
    ContactNotFound(UserIdentity),

    #[error("Cannot look up {contact}: {source}")]
    ContactSearch {
        contact: UserIdentity,
        source: IdentityServiceError,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("A sign-in is already in progress")]
    AuthenticationInProgress,

    #[error("No user is logged in")]
    NotLoggedIn,

    #[error("Background worker is not running")]
    WorkerUnavailable,

    #[error("Background task failed: {0}")]
    BackgroundPanic(String),

    #[error("Session controller has stopped")]
    ControllerClosed,
}

impl SessionError {
    pub fn classify(&self) -> ErrorClass {
        match self {
            Self::Store(_) => ErrorClass::Fatal,

            Self::IdentityInit(_)
            | Self::MissingCredentials(_)
            | Self::SignIn(_)
            | Self::SignUp(_)
            | Self::TransportPassword(_)
            | Self::Transport(_)
            | Self::WorkerUnavailable
            | Self::BackgroundPanic(_) => ErrorClass::RecoverableLogout,

            Self::Decrypt { .. } | Self::MalformedMessage { .. } | Self::MissingSender(_) => {
                ErrorClass::SilentDiscard
            }

            // An outgoing message stays recorded as sent; nothing else to undo.
            Self::Encrypt { .. } | Self::ContactNotFound(_) | Self::ContactSearch { .. } => {
                ErrorClass::Informational
            }

            Self::AuthenticationInProgress | Self::NotLoggedIn | Self::ControllerClosed => {
                ErrorClass::Rejected
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_failures_never_log_out() {
        let sender = UserIdentity::from("alice");
        let discards = [
            SessionError::Decrypt {
                sender: sender.clone(),
                source: IdentityServiceError::Crypto("bad tag".into()),
            },
            SessionError::MalformedMessage {
                sender,
                reason: "missing payload".into(),
            },
            SessionError::MissingSender("xmpp.veil.chat".into()),
        ];
        for err in discards {
            assert_eq!(err.classify(), ErrorClass::SilentDiscard, "{err}");
        }
    }

    #[test]
    fn test_authentication_failures_log_out() {
        assert_eq!(
            SessionError::MissingCredentials(UserIdentity::from("bob")).classify(),
            ErrorClass::RecoverableLogout
        );
        assert_eq!(
            SessionError::Transport(TransportError::Tls("untrusted".into())).classify(),
            ErrorClass::RecoverableLogout
        );
        assert_eq!(
            SessionError::IdentityInit(IdentityServiceError::InitFailed("down".into())).classify(),
            ErrorClass::RecoverableLogout
        );
        assert_eq!(
            SessionError::BackgroundPanic("boom".into()).classify(),
            ErrorClass::RecoverableLogout
        );
    }

    #[test]
    fn test_contact_not_found_is_informational() {
        let err = SessionError::ContactNotFound(UserIdentity::from("carol"));
        assert_eq!(err.classify(), ErrorClass::Informational);
        assert_eq!(err.to_string(), "User is not registered : carol");
    }

    #[test]
    fn test_store_failure_is_fatal() {
        let err = SessionError::Store(StoreError::NoDataDir);
        assert_eq!(err.classify(), ErrorClass::Fatal);
    }
}
