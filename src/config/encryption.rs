//! AES-256-GCM encryption at rest for the object-storage credentials row
//! (§4.3, §7 "Fatal configuration: missing encryption key"). Grounded on
//! `original_source/operator/admin/manage_api_keys.py`'s `ENCRYPTION_KEY`
//! contract: the master key comes from the environment, never the table
//! itself, and its absence when an encrypted row is expected is a
//! startup-fatal condition, not a silent plaintext fallback. `aes-gcm`
//! extends the RustCrypto family this stack already pulls in via `sha2`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::{ConfigError, ConfigResult};

const NONCE_LEN: usize = 12;

/// A 256-bit key derived from the `ENCRYPTION_KEY` environment variable.
/// Derivation (rather than requiring exactly 32 raw bytes) lets an operator
/// supply a passphrase of any length.
pub struct EncryptionKey(Box<[u8; 32]>);

impl EncryptionKey {
    pub fn from_env() -> ConfigResult<Self> {
        let raw = std::env::var("ENCRYPTION_KEY").map_err(|_| {
            ConfigError::Fatal(
                "ENCRYPTION_KEY not set; cannot encrypt or decrypt object storage credentials".into(),
            )
        })?;
        Ok(Self::derive(raw.as_bytes()))
    }

    fn derive(material: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(material);
        let digest = hasher.finalize();
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self(Box::new(key))
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.0.as_slice()))
    }
}

/// Encrypts `plaintext`, returning a base64 string of `nonce || ciphertext`.
pub fn encrypt(plaintext: &[u8], key: &EncryptionKey) -> ConfigResult<String> {
    let cipher = key.cipher();
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| ConfigError::Fatal(format!("encryption failed: {e}")))?;

    let mut blob = nonce_bytes.to_vec();
    blob.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(blob))
}

/// Inverse of [`encrypt`].
pub fn decrypt(encoded: &str, key: &EncryptionKey) -> ConfigResult<Vec<u8>> {
    let blob = STANDARD
        .decode(encoded)
        .map_err(|e| ConfigError::Fatal(format!("corrupt encrypted credentials: {e}")))?;
    if blob.len() < NONCE_LEN {
        return Err(ConfigError::Fatal("corrupt encrypted credentials: too short".into()));
    }
    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);
    key.cipher()
        .decrypt(nonce, ciphertext)
        .map_err(|e| ConfigError::Fatal(format!("decryption failed, wrong key or corrupt data: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encrypt_decrypt() {
        let key = EncryptionKey::derive(b"test-passphrase");
        let plaintext = br#"{"endpoint":"https://s3.example.com"}"#;
        let encrypted = encrypt(plaintext, &key).unwrap();
        assert_ne!(encrypted.as_bytes(), plaintext);
        let decrypted = decrypt(&encrypted, &key).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn different_keys_fail_to_decrypt() {
        let key_a = EncryptionKey::derive(b"key-a");
        let key_b = EncryptionKey::derive(b"key-b");
        let encrypted = encrypt(b"secret", &key_a).unwrap();
        assert!(decrypt(&encrypted, &key_b).is_err());
    }

    #[test]
    fn each_encryption_uses_a_fresh_nonce() {
        let key = EncryptionKey::derive(b"same-key");
        let a = encrypt(b"same-plaintext", &key).unwrap();
        let b = encrypt(b"same-plaintext", &key).unwrap();
        assert_ne!(a, b);
    }
}
