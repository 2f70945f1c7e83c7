use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::constants::{KDF_CONTEXT_PAIR_KEY, NONCE_SIZE};
use crate::error::CryptoError;

pub type SymmetricKey = [u8; 32];

pub fn generate_symmetric_key() -> SymmetricKey {
    let mut key = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

// Returns nonce || ciphertext (24 bytes nonce prepended)
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce_bytes = generate_nonce();
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

pub fn decrypt(key: &SymmetricKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = XNonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Encrypt and base64-encode, producing a text-safe message body.
pub fn encrypt_to_text(key: &SymmetricKey, plaintext: &[u8]) -> Result<String, CryptoError> {
    Ok(STANDARD.encode(encrypt(key, plaintext)?))
}

/// Inverse of [`encrypt_to_text`]. The output is sized to the actual
/// plaintext.
pub fn decrypt_from_text(key: &SymmetricKey, text: &str) -> Result<Vec<u8>, CryptoError> {
    let data = STANDARD
        .decode(text.trim())
        .map_err(|_| CryptoError::InvalidEncoding)?;
    decrypt(key, &data)
}

// BLAKE3 KDF with domain separation. Identities are ordered so both sides of
// a conversation derive the same key.
pub fn derive_pair_key(shared_secret: &[u8], a: &str, b: &str) -> SymmetricKey {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_PAIR_KEY);
    hasher.update(shared_secret);
    hasher.update(first.as_bytes());
    hasher.update(&[0]);
    hasher.update(second.as_bytes());
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = generate_symmetric_key();
        let plaintext = b"meet me at the usual place";

        let encrypted = encrypt(&key, plaintext).unwrap();
        let decrypted = decrypt(&key, &encrypted).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = generate_symmetric_key();
        let key2 = generate_symmetric_key();

        let encrypted = encrypt(&key1, b"Secret message").unwrap();
        assert!(decrypt(&key2, &encrypted).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = generate_symmetric_key();

        let mut encrypted = encrypt(&key, b"Important data").unwrap();
        let len = encrypted.len();
        encrypted[len - 1] ^= 0xFF;

        assert!(decrypt(&key, &encrypted).is_err());
    }

    #[test]
    fn test_empty_data_fails() {
        let key = generate_symmetric_key();
        assert!(decrypt(&key, &[]).is_err());
    }

    #[test]
    fn test_text_form_has_no_fixed_ceiling() {
        let key = generate_symmetric_key();
        let large = vec![b'x'; 64 * 1024];

        let text = encrypt_to_text(&key, &large).unwrap();
        assert_eq!(decrypt_from_text(&key, &text).unwrap(), large);
    }

    #[test]
    fn test_text_form_rejects_bad_base64() {
        let key = generate_symmetric_key();
        assert!(matches!(
            decrypt_from_text(&key, "hello"),
            Err(CryptoError::InvalidEncoding) | Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_pair_key_symmetric() {
        let secret = b"dh-output";
        assert_eq!(
            derive_pair_key(secret, "alice", "bob"),
            derive_pair_key(secret, "bob", "alice")
        );
        assert_ne!(
            derive_pair_key(secret, "alice", "bob"),
            derive_pair_key(secret, "alice", "carol")
        );
    }
}
