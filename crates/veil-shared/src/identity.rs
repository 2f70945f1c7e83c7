use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::constants::{CREDENTIAL_BLOB_SIZE, KDF_CONTEXT_TRANSPORT_PASSWORD};
use crate::credentials::CredentialBlob;
use crate::error::IdentityError;

pub use ed25519_dalek::Signature;

/// Private key material of a registered user.
///
/// Ed25519 proves possession of the credentials at sign-in; X25519 provides
/// the static Diffie-Hellman key used to derive per-conversation keys.
#[derive(Clone)]
pub struct Identity {
    signing_key: SigningKey,
    exchange_secret: StaticSecret,
}

/// Public half of an [`Identity`], as published to the identity service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicIdentity {
    pub verifying_key: [u8; 32],
    pub exchange_key: [u8; 32],
}

impl Identity {
    /// Generate a new random identity
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
            exchange_secret: StaticSecret::random_from_rng(OsRng),
        }
    }

    /// Restore an identity from its credential blob
    pub fn from_credentials(blob: &CredentialBlob) -> Self {
        let bytes = blob.as_bytes();
        let mut exchange = [0u8; 32];
        let mut seed = [0u8; 32];
        exchange.copy_from_slice(&bytes[..32]);
        seed.copy_from_slice(&bytes[32..]);
        Self {
            signing_key: SigningKey::from_bytes(&seed),
            exchange_secret: StaticSecret::from(exchange),
        }
    }

    /// Export as a credential blob: X25519 secret || Ed25519 seed
    pub fn to_credentials(&self) -> CredentialBlob {
        let mut bytes = [0u8; CREDENTIAL_BLOB_SIZE];
        bytes[..32].copy_from_slice(&self.exchange_secret.to_bytes());
        bytes[32..].copy_from_slice(self.signing_key.as_bytes());
        CredentialBlob::from_bytes(bytes)
    }

    pub fn public_identity(&self) -> PublicIdentity {
        PublicIdentity {
            verifying_key: self.signing_key.verifying_key().to_bytes(),
            exchange_key: PublicKey::from(&self.exchange_secret).to_bytes(),
        }
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    /// Static Diffie-Hellman with a peer's published exchange key
    pub fn shared_secret(&self, peer_exchange_key: &[u8; 32]) -> [u8; 32] {
        let peer = PublicKey::from(*peer_exchange_key);
        *self.exchange_secret.diffie_hellman(&peer).as_bytes()
    }

    /// Password presented to the messaging network, derived from the
    /// signing key so it never has to be stored separately.
    pub fn transport_password(&self) -> String {
        let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_TRANSPORT_PASSWORD);
        hasher.update(self.signing_key.as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

/// Verify a signature against a public key
pub fn verify_signature(
    pubkey_bytes: &[u8; 32],
    message: &[u8],
    signature: &Signature,
) -> Result<(), IdentityError> {
    let verifying_key =
        VerifyingKey::from_bytes(pubkey_bytes).map_err(|_| IdentityError::InvalidKeyBytes)?;
    verifying_key
        .verify(message, signature)
        .map_err(|_| IdentityError::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_roundtrip() {
        let id = Identity::generate();
        let restored = Identity::from_credentials(&id.to_credentials());
        assert_eq!(id.public_identity(), restored.public_identity());
        assert_eq!(id.transport_password(), restored.transport_password());
    }

    #[test]
    fn test_sign_verify() {
        let id = Identity::generate();
        let public = id.public_identity();
        let signature = id.sign(b"sign-in challenge");

        assert!(verify_signature(&public.verifying_key, b"sign-in challenge", &signature).is_ok());
        assert!(verify_signature(&public.verifying_key, b"wrong", &signature).is_err());
    }

    #[test]
    fn test_shared_secret_agrees() {
        let alice = Identity::generate();
        let bob = Identity::generate();

        let ab = alice.shared_secret(&bob.public_identity().exchange_key);
        let ba = bob.shared_secret(&alice.public_identity().exchange_key);
        assert_eq!(ab, ba);
    }
}
