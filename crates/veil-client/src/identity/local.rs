//! Self-contained identity service.
//!
//! An [`IdentityDirectory`] plays the part of the identity servers: it keeps
//! the published keys of every registered user, per service URL. Each
//! [`LocalIdentityService`] is one client's view of it, holding the signed-in
//! user's private keys.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use veil_shared::crypto;
use veil_shared::identity::{verify_signature, Identity, PublicIdentity, Signature};
use veil_shared::{CredentialBlob, UserIdentity};

use super::{IdentityService, IdentityServiceError};

#[derive(Default)]
struct DirectoryState {
    /// service url -> user -> published keys
    services: HashMap<String, HashMap<UserIdentity, PublicIdentity>>,
    offline: HashSet<String>,
    /// sign-in challenges handed out and not yet answered
    challenges: HashSet<[u8; 32]>,
}

/// Registry of published identities shared by every client of a test or demo.
#[derive(Clone, Default)]
pub struct IdentityDirectory {
    inner: Arc<Mutex<DirectoryState>>,
}

impl IdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make initialization against `service_url` fail until
    /// [`bring_online`](Self::bring_online) is called.
    pub fn take_offline(&self, service_url: &str) {
        self.lock().offline.insert(service_url.to_string());
    }

    pub fn bring_online(&self, service_url: &str) {
        self.lock().offline.remove(service_url);
    }

    pub fn is_registered(&self, service_url: &str, user: &UserIdentity) -> bool {
        self.lock()
            .services
            .get(service_url)
            .is_some_and(|users| users.contains_key(user))
    }

    fn is_online(&self, service_url: &str) -> bool {
        !self.lock().offline.contains(service_url)
    }

    fn register(
        &self,
        service_url: &str,
        user: &UserIdentity,
        public: PublicIdentity,
    ) -> Result<(), IdentityServiceError> {
        let mut state = self.lock();
        let users = state.services.entry(service_url.to_string()).or_default();
        if users.contains_key(user) {
            return Err(IdentityServiceError::AlreadyRegistered(user.clone()));
        }
        users.insert(user.clone(), public);
        Ok(())
    }

    fn lookup(&self, service_url: &str, user: &UserIdentity) -> Option<PublicIdentity> {
        self.lock().services.get(service_url)?.get(user).copied()
    }

    /// Hand out a single-use sign-in challenge.
    fn issue_challenge(&self) -> [u8; 32] {
        let challenge: [u8; 32] = rand::random();
        self.lock().challenges.insert(challenge);
        challenge
    }

    /// Check `signature` over a challenge this directory issued against the
    /// key registered under `verifying_key`. Returns the key's owner.
    fn answer_challenge(
        &self,
        service_url: &str,
        verifying_key: &[u8; 32],
        challenge: &[u8; 32],
        signature: &Signature,
    ) -> Result<UserIdentity, IdentityServiceError> {
        let (user, public) = {
            let mut state = self.lock();
            if !state.challenges.remove(challenge) {
                return Err(IdentityServiceError::Rejected(
                    "unknown or reused challenge".into(),
                ));
            }
            let owner = state
                .services
                .get(service_url)
                .and_then(|users| {
                    users
                        .iter()
                        .find(|(_, public)| &public.verifying_key == verifying_key)
                })
                .map(|(user, public)| (user.clone(), *public));
            owner.ok_or_else(|| IdentityServiceError::Rejected("unknown credentials".into()))?
        };

        verify_signature(&public.verifying_key, challenge, signature)
            .map_err(|e| IdentityServiceError::Rejected(e.to_string()))?;
        Ok(user)
    }

    fn lock(&self) -> MutexGuard<'_, DirectoryState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Default)]
struct LocalSession {
    service_url: Option<String>,
    signed_in: Option<(UserIdentity, Identity)>,
}

pub struct LocalIdentityService {
    directory: IdentityDirectory,
    session: Mutex<LocalSession>,
}

impl LocalIdentityService {
    pub fn new(directory: IdentityDirectory) -> Self {
        Self {
            directory,
            session: Mutex::new(LocalSession::default()),
        }
    }

    fn session(&self) -> MutexGuard<'_, LocalSession> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn service_url(&self) -> Result<String, IdentityServiceError> {
        self.session()
            .service_url
            .clone()
            .ok_or(IdentityServiceError::NotInitialized)
    }

    fn signed_in(&self) -> Result<(UserIdentity, Identity), IdentityServiceError> {
        self.session()
            .signed_in
            .clone()
            .ok_or(IdentityServiceError::NotSignedIn)
    }

    /// Conversation key between the signed-in user and `peer`.
    fn pair_key(&self, peer: &UserIdentity) -> Result<crypto::SymmetricKey, IdentityServiceError> {
        let url = self.service_url()?;
        let (me, identity) = self.signed_in()?;
        let peer_keys = self
            .directory
            .lookup(&url, peer)
            .ok_or_else(|| IdentityServiceError::UnknownUser(peer.clone()))?;
        let shared = identity.shared_secret(&peer_keys.exchange_key);
        Ok(crypto::derive_pair_key(&shared, me.as_str(), peer.as_str()))
    }
}

impl IdentityService for LocalIdentityService {
    fn init(
        &self,
        service_url: &str,
        ca_bundle: Option<&Path>,
    ) -> Result<(), IdentityServiceError> {
        if let Some(bundle) = ca_bundle {
            if !bundle.exists() {
                return Err(IdentityServiceError::InitFailed(format!(
                    "CA bundle {} not found",
                    bundle.display()
                )));
            }
        }
        if !self.directory.is_online(service_url) {
            return Err(IdentityServiceError::InitFailed(format!(
                "{service_url} is unreachable"
            )));
        }

        let mut session = self.session();
        session.service_url = Some(service_url.to_string());
        session.signed_in = None;
        debug!(url = %service_url, "Identity service initialized");
        Ok(())
    }

    fn sign_up(&self, user: &UserIdentity) -> Result<CredentialBlob, IdentityServiceError> {
        let url = self.service_url()?;
        let identity = Identity::generate();
        self.directory.register(&url, user, identity.public_identity())?;

        let credentials = identity.to_credentials();
        self.session().signed_in = Some((user.clone(), identity));
        info!(user = %user, "Registered new identity");
        Ok(credentials)
    }

    fn sign_in(&self, credentials: &CredentialBlob) -> Result<(), IdentityServiceError> {
        let url = self.service_url()?;
        let identity = Identity::from_credentials(credentials);

        let challenge = self.directory.issue_challenge();
        let signature = identity.sign(&challenge);
        let user = self.directory.answer_challenge(
            &url,
            &identity.public_identity().verifying_key,
            &challenge,
            &signature,
        )?;

        self.session().signed_in = Some((user.clone(), identity));
        info!(user = %user, "Signed in");
        Ok(())
    }

    fn sign_out(&self) {
        if let Some((user, _)) = self.session().signed_in.take() {
            debug!(user = %user, "Signed out");
        }
    }

    fn transport_password(&self) -> Result<String, IdentityServiceError> {
        let (_, identity) = self.signed_in()?;
        Ok(identity.transport_password())
    }

    fn search(&self, contact: &UserIdentity) -> Result<bool, IdentityServiceError> {
        let url = self.service_url()?;
        Ok(self.directory.is_registered(&url, contact))
    }

    fn encrypt(
        &self,
        recipient: &UserIdentity,
        plaintext: &[u8],
    ) -> Result<String, IdentityServiceError> {
        let key = self.pair_key(recipient)?;
        Ok(crypto::encrypt_to_text(&key, plaintext)?)
    }

    fn decrypt(
        &self,
        sender: &UserIdentity,
        ciphertext: &str,
    ) -> Result<Vec<u8>, IdentityServiceError> {
        let key = self.pair_key(sender)?;
        Ok(crypto::decrypt_from_text(&key, ciphertext)?)
    }
}
