//! Secret encryption for values stored at rest.
//!
//! Credential values, access-key secrets, cloud account passwords and the
//! secret attributes of some asset types (license codes, default passwords)
//! pass through a [`SecretCipher`] before they reach the database. The
//! default cipher is AES-256-GCM; a plaintext cipher exists for local
//! development when no key is configured.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::Rng;
use std::sync::Arc;
use thiserror::Error;

/// Environment variable holding the base64-encoded 32-byte key.
pub const ENCRYPTION_KEY_ENV: &str = "CMDB_ENCRYPTION_KEY";

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The encryption key is invalid (wrong size or format).
    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    /// Encryption failed.
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed (corrupted ciphertext or a different key).
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),
}

/// A symmetric cipher for secrets stored at rest.
pub trait SecretCipher: Send + Sync {
    /// Encrypts a plaintext string, returning an encoded ciphertext.
    fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError>;

    /// Decrypts an encoded ciphertext, returning the original plaintext.
    fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError>;

    /// Short name of the algorithm, used in logs.
    fn algorithm(&self) -> &'static str;
}

/// AES-256-GCM cipher.
///
/// Ciphertext format: `base64(nonce || ciphertext || tag)`
/// - Nonce: 12 bytes
/// - Tag: 16 bytes, appended by aes-gcm
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    /// Creates a cipher with the given 32-byte key.
    pub fn new(key: [u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
        }
    }

    /// Creates a cipher from a base64-encoded key.
    pub fn from_base64_key(key_base64: &str) -> Result<Self, CryptoError> {
        let key_bytes = BASE64
            .decode(key_base64.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("Invalid base64: {}", e)))?;

        let key: [u8; 32] = key_bytes.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "Key must be 32 bytes, got {} bytes",
                key_bytes.len()
            ))
        })?;

        Ok(Self::new(key))
    }
}

impl SecretCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(&combined))
    }

    fn decrypt(&self, ciphertext_base64: &str) -> Result<String, CryptoError> {
        let combined = BASE64
            .decode(ciphertext_base64)
            .map_err(|e| CryptoError::DecryptionFailed(format!("Invalid base64: {}", e)))?;

        if combined.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::DecryptionFailed(
                "Ciphertext too short".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext_bytes = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed("Decryption failed".to_string()))?;

        String::from_utf8(plaintext_bytes)
            .map_err(|e| CryptoError::DecryptionFailed(format!("Invalid UTF-8: {}", e)))
    }

    fn algorithm(&self) -> &'static str {
        "aes-256-gcm"
    }
}

/// A no-op cipher that stores secrets in plaintext.
/// Only for development and tests.
pub struct PlaintextCipher;

impl SecretCipher for PlaintextCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        Ok(plaintext.to_string())
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        Ok(ciphertext.to_string())
    }

    fn algorithm(&self) -> &'static str {
        "plaintext"
    }
}

/// Builds the cipher for a configured key.
///
/// A missing or blank key falls back to [`PlaintextCipher`] with a warning.
/// A key that is present but malformed is an error.
///
/// Generate a key with `cmdb generate-key` or `openssl rand -base64 32`.
pub fn create_cipher(key_base64: Option<&str>) -> Result<Arc<dyn SecretCipher>, CryptoError> {
    match key_base64.map(str::trim).filter(|k| !k.is_empty()) {
        Some(key) => {
            let cipher = AesGcmCipher::from_base64_key(key)?;
            tracing::info!("Secret encryption enabled with AES-256-GCM");
            Ok(Arc::new(cipher))
        }
        None => {
            tracing::warn!(
                "{} not set. Secrets will be stored in PLAINTEXT. \
                 Configure a 32-byte base64-encoded key for production.",
                ENCRYPTION_KEY_ENV
            );
            Ok(Arc::new(PlaintextCipher))
        }
    }
}

/// Builds the cipher from the `CMDB_ENCRYPTION_KEY` environment variable.
pub fn create_cipher_from_env() -> Result<Arc<dyn SecretCipher>, CryptoError> {
    create_cipher(std::env::var(ENCRYPTION_KEY_ENV).ok().as_deref())
}

/// Generates a random 32-byte encryption key, base64 encoded.
pub fn generate_encryption_key() -> String {
    let mut key = [0u8; 32];
    rand::thread_rng().fill(&mut key);
    BASE64.encode(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn test_cipher() -> AesGcmCipher {
        AesGcmCipher::new([7u8; 32])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = test_cipher();
        let ciphertext = cipher.encrypt("root:hunter2").unwrap();

        assert_ne!(ciphertext, "root:hunter2");
        assert_eq!(cipher.decrypt(&ciphertext).unwrap(), "root:hunter2");
    }

    #[test]
    fn test_encrypt_decrypt_unicode() {
        let cipher = test_cipher();
        let plaintext = "默认密码🔐";

        let ciphertext = cipher.encrypt(plaintext).unwrap();
        assert_eq!(cipher.decrypt(&ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn test_random_nonces() {
        let cipher = test_cipher();
        let first = cipher.encrypt("same").unwrap();
        let second = cipher.encrypt("same").unwrap();

        assert_ne!(first, second);
        assert_eq!(cipher.decrypt(&first).unwrap(), "same");
        assert_eq!(cipher.decrypt(&second).unwrap(), "same");
    }

    #[test]
    fn test_decrypt_tampered_ciphertext() {
        let cipher = test_cipher();
        let ciphertext = cipher.encrypt("secret").unwrap();

        let mut bytes = BASE64.decode(&ciphertext).unwrap();
        bytes[15] ^= 0xFF;
        let tampered = BASE64.encode(&bytes);

        assert!(matches!(
            cipher.decrypt(&tampered),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_decrypt_truncated_and_invalid() {
        let cipher = test_cipher();
        assert!(cipher.decrypt(&BASE64.encode([0u8; 20])).is_err());
        assert!(matches!(
            cipher.decrypt("not-valid-base64!!!"),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_from_base64_key() {
        assert!(AesGcmCipher::from_base64_key(&BASE64.encode([42u8; 32])).is_ok());
        assert!(matches!(
            AesGcmCipher::from_base64_key(&BASE64.encode([42u8; 16])),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(matches!(
            AesGcmCipher::from_base64_key("not-valid-base64!!!"),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_different_keys_are_incompatible() {
        let first = AesGcmCipher::new([1u8; 32]);
        let second = AesGcmCipher::new([2u8; 32]);

        let ciphertext = first.encrypt("secret").unwrap();
        assert!(second.decrypt(&ciphertext).is_err());
    }

    #[test]
    fn test_create_cipher() {
        let plaintext = create_cipher(None).unwrap();
        assert_eq!(plaintext.algorithm(), "plaintext");

        let blank = create_cipher(Some("  ")).unwrap();
        assert_eq!(blank.algorithm(), "plaintext");

        let key = generate_encryption_key();
        let aes = create_cipher(Some(&key)).unwrap();
        assert_eq!(aes.algorithm(), "aes-256-gcm");

        assert!(create_cipher(Some("short")).is_err());
    }

    #[test]
    #[serial]
    fn test_create_cipher_from_env() {
        std::env::set_var(ENCRYPTION_KEY_ENV, generate_encryption_key());
        let cipher = create_cipher_from_env().unwrap();
        assert_eq!(cipher.algorithm(), "aes-256-gcm");
        std::env::remove_var(ENCRYPTION_KEY_ENV);

        let cipher = create_cipher_from_env().unwrap();
        assert_eq!(cipher.algorithm(), "plaintext");
    }

    #[test]
    fn test_generate_encryption_key() {
        let first = generate_encryption_key();
        let second = generate_encryption_key();

        assert_ne!(first, second);
        assert_eq!(BASE64.decode(&first).unwrap().len(), 32);
    }
}
