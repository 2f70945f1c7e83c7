//! Identity Session: the seam to the identity/crypto service.
//!
//! Every method may block on network or crypto work. The session controller
//! only calls them from its [`BackgroundWorker`](crate::worker::BackgroundWorker),
//! one call at a time.

pub mod local;

use std::path::Path;

use thiserror::Error;

use veil_shared::error::CryptoError;
use veil_shared::{CredentialBlob, UserIdentity};

pub use local::{IdentityDirectory, LocalIdentityService};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityServiceError {
    #[error("identity service is not initialized")]
    NotInitialized,

    #[error("identity service initialization failed: {0}")]
    InitFailed(String),

    #[error("user {0} is already registered")]
    AlreadyRegistered(UserIdentity),

    #[error("credentials were rejected: {0}")]
    Rejected(String),

    #[error("no user is signed in")]
    NotSignedIn,

    #[error("user {0} is not registered")]
    UnknownUser(UserIdentity),

    #[error("crypto failure: {0}")]
    Crypto(String),
}

impl From<CryptoError> for IdentityServiceError {
    fn from(e: CryptoError) -> Self {
        Self::Crypto(e.to_string())
    }
}

pub trait IdentityService: Send + Sync + 'static {
    /// Point the service at `service_url`. Must succeed before anything else;
    /// re-initializing drops any signed-in state.
    fn init(&self, service_url: &str, ca_bundle: Option<&Path>)
        -> Result<(), IdentityServiceError>;

    /// Register `user` and return the credentials needed for later sign-ins.
    /// A successful sign-up leaves the user signed in.
    fn sign_up(&self, user: &UserIdentity) -> Result<CredentialBlob, IdentityServiceError>;

    /// Restore the server-side session of a registered user.
    fn sign_in(&self, credentials: &CredentialBlob) -> Result<(), IdentityServiceError>;

    fn sign_out(&self);

    /// Password for the messaging network, available once signed in.
    fn transport_password(&self) -> Result<String, IdentityServiceError>;

    /// Whether `contact` is a registered identity.
    fn search(&self, contact: &UserIdentity) -> Result<bool, IdentityServiceError>;

    fn encrypt(
        &self,
        recipient: &UserIdentity,
        plaintext: &[u8],
    ) -> Result<String, IdentityServiceError>;

    fn decrypt(
        &self,
        sender: &UserIdentity,
        ciphertext: &str,
    ) -> Result<Vec<u8>, IdentityServiceError>;
}
