//! Credential blob issued at sign-up and required at sign-in.
//!
//! The blob itself is a fixed-size opaque byte payload. Its stored form is a
//! versioned bincode record, base64-encoded so it fits a text column.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::constants::{CREDENTIAL_BLOB_SIZE, CREDENTIAL_FORMAT_VERSION};

#[derive(Clone, PartialEq, Eq)]
pub struct CredentialBlob([u8; CREDENTIAL_BLOB_SIZE]);

#[derive(Serialize, Deserialize)]
struct StoredCredential {
    version: u8,
    bytes: Vec<u8>,
}

impl CredentialBlob {
    pub fn from_bytes(bytes: [u8; CREDENTIAL_BLOB_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build a blob from a slice; `None` unless the length matches exactly.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; CREDENTIAL_BLOB_SIZE] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; CREDENTIAL_BLOB_SIZE] {
        &self.0
    }

    /// Encode for storage.
    pub fn encode(&self) -> String {
        let record = StoredCredential {
            version: CREDENTIAL_FORMAT_VERSION,
            bytes: self.0.to_vec(),
        };
        // Serializing a u8 and a Vec<u8> into memory cannot fail.
        let raw = bincode::serialize(&record).unwrap_or_default();
        STANDARD.encode(raw)
    }

    /// Decode a stored value. Anything that is not a current-version record
    /// of exactly [`CREDENTIAL_BLOB_SIZE`] bytes yields `None`.
    pub fn decode(stored: &str) -> Option<Self> {
        let raw = STANDARD.decode(stored.trim()).ok()?;
        // Same layout as `bincode::serialize`, but a record followed by
        // anything else is corrupt.
        let record: StoredCredential = bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .reject_trailing_bytes()
            .deserialize(&raw)
            .ok()?;
        if record.version != CREDENTIAL_FORMAT_VERSION {
            tracing::warn!(version = record.version, "unsupported credential format");
            return None;
        }
        Self::from_slice(&record.bytes)
    }
}

impl std::fmt::Debug for CredentialBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialBlob(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CredentialBlob {
        let mut bytes = [0u8; CREDENTIAL_BLOB_SIZE];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        CredentialBlob::from_bytes(bytes)
    }

    #[test]
    fn test_encode_decode() {
        let blob = sample();
        let decoded = CredentialBlob::decode(&blob.encode()).unwrap();
        assert_eq!(decoded, blob);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let record = StoredCredential {
            version: CREDENTIAL_FORMAT_VERSION,
            bytes: vec![7u8; CREDENTIAL_BLOB_SIZE - 1],
        };
        let stored = STANDARD.encode(bincode::serialize(&record).unwrap());
        assert!(CredentialBlob::decode(&stored).is_none());
    }

    #[test]
    fn test_truncated_encoding_rejected() {
        let encoded = sample().encode();
        let truncated = &encoded[..encoded.len() / 2];
        assert!(CredentialBlob::decode(truncated).is_none());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let record = StoredCredential {
            version: CREDENTIAL_FORMAT_VERSION + 1,
            bytes: vec![0u8; CREDENTIAL_BLOB_SIZE],
        };
        let stored = STANDARD.encode(bincode::serialize(&record).unwrap());
        assert!(CredentialBlob::decode(&stored).is_none());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut raw = STANDARD.decode(sample().encode()).unwrap();
        raw.extend_from_slice(b"CORRUPTED-TAIL");
        let stored = STANDARD.encode(&raw);
        assert!(CredentialBlob::decode(&stored).is_none());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(CredentialBlob::decode("").is_none());
        assert!(CredentialBlob::decode("%%% not base64 %%%").is_none());
    }

    #[test]
    fn test_debug_redacts() {
        assert_eq!(format!("{:?}", sample()), "CredentialBlob(..)");
    }
}
