//! At-rest encryption for `LlmConfig.api_key`, ported from
//! `original_source/backend/services/encryption.py`, and constant-time
//! token comparison for the shared-secret auth check.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::error::{CoreError, CoreResult};

/// Derives a 32-byte AES-256 key from the `ENCRYPTION_KEY` env value by
/// hashing it with SHA-256, so operators can supply a passphrase of any
/// length rather than a raw key of the exact size.
fn derive_key(encryption_key: &str) -> Key<Aes256Gcm> {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(encryption_key.as_bytes());
    *Key::<Aes256Gcm>::from_slice(&digest)
}

/// Encrypts `plaintext` under `ENCRYPTION_KEY`, returning
/// `base64(nonce || ciphertext)`.
pub fn encrypt(encryption_key: &str, plaintext: &str) -> CoreResult<String> {
    let key = derive_key(encryption_key);
    let cipher = Aes256Gcm::new(&key);

    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| CoreError::internal(anyhow::anyhow!("encryption failed: {e}")))?;

    let mut out = Vec::with_capacity(nonce_bytes.len() + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(out))
}

pub fn decrypt(encryption_key: &str, encoded: &str) -> CoreResult<String> {
    let raw = BASE64
        .decode(encoded)
        .map_err(|e| CoreError::internal(anyhow::anyhow!("invalid ciphertext encoding: {e}")))?;
    if raw.len() < 12 {
        return Err(CoreError::internal(anyhow::anyhow!("ciphertext too short")));
    }
    let (nonce_bytes, ciphertext) = raw.split_at(12);
    let key = derive_key(encryption_key);
    let cipher = Aes256Gcm::new(&key);
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| CoreError::internal(anyhow::anyhow!("decryption failed: {e}")))?;

    String::from_utf8(plaintext)
        .map_err(|e| CoreError::internal(anyhow::anyhow!("decrypted payload not utf8: {e}")))
}

/// Hashes a raw API key for storage, matching the sha256 hex digest in
/// `original_source/backend/api/routes_api_keys.py`. The raw key is
/// returned to the caller once at creation time and never stored.
pub fn hash_api_key(raw_key: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(raw_key.as_bytes());
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Constant-time token comparison, matching `hmac.compare_digest` in
/// `original_source/backend/api/auth.py`.
pub fn tokens_equal(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trips() {
        let key = "super-secret-passphrase";
        let ciphertext = encrypt(key, "sk-provider-abc123").unwrap();
        assert_ne!(ciphertext, "sk-provider-abc123");
        let plaintext = decrypt(key, &ciphertext).unwrap();
        assert_eq!(plaintext, "sk-provider-abc123");
    }

    #[test]
    fn decrypt_fails_with_wrong_key() {
        let ciphertext = encrypt("key-one", "hello").unwrap();
        assert!(decrypt("key-two", &ciphertext).is_err());
    }

    #[test]
    fn hash_api_key_is_deterministic_and_hex() {
        let a = hash_api_key("kure-abc123");
        let b = hash_api_key("kure-abc123");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn tokens_equal_matches_same_length_and_content() {
        assert!(tokens_equal("abc123", "abc123"));
        assert!(!tokens_equal("abc123", "abc124"));
        assert!(!tokens_equal("abc", "abcd"));
    }
}
