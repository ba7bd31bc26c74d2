//! Stored password decoding.
//!
//! Passwords are stored together with the algorithm that produced them. Only
//! AES-encoded passwords can be turned back into clear text; AES payloads are
//! AES-256-GCM (nonce || ciphertext || tag, base64) under an HKDF-SHA256 key
//! derived from the master key.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

/// Length of AES-256 key in bytes.
const KEY_LENGTH: usize = 32;

/// Length of GCM nonce in bytes.
const NONCE_LENGTH: usize = 12;

/// Length of GCM authentication tag in bytes.
const TAG_LENGTH: usize = 16;

/// Context string for HKDF key derivation.
const HKDF_INFO: &[u8] = b"xavyo-propagation-passwords-v1";

/// Cipher errors.
#[derive(Debug, Error)]
pub enum CipherError {
    /// The master key could not be parsed.
    #[error("Invalid master key: {message}")]
    InvalidKey { message: String },

    /// The algorithm is one-way.
    #[error("Password stored with {algorithm} cannot be decoded")]
    NotReversible { algorithm: CipherAlgorithm },

    /// Encryption failed.
    #[error("Encryption failed: {message}")]
    EncryptionFailed { message: String },

    /// Decryption failed.
    #[error("Decryption failed: {message}")]
    DecryptionFailed { message: String },
}

/// Algorithm a password was stored with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CipherAlgorithm {
    Sha1,
    Sha256,
    Ssha256,
    Bcrypt,
    Aes,
}

impl CipherAlgorithm {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CipherAlgorithm::Sha1 => "sha1",
            CipherAlgorithm::Sha256 => "sha256",
            CipherAlgorithm::Ssha256 => "ssha256",
            CipherAlgorithm::Bcrypt => "bcrypt",
            CipherAlgorithm::Aes => "aes",
        }
    }

    /// Whether the clear text can be recovered.
    #[must_use]
    pub fn is_reversible(&self) -> bool {
        matches!(self, CipherAlgorithm::Aes)
    }
}

impl std::fmt::Display for CipherAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A password as kept in the authoritative store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPassword {
    pub algorithm: CipherAlgorithm,
    pub value: String,
}

impl StoredPassword {
    pub fn new(algorithm: CipherAlgorithm, value: impl Into<String>) -> Self {
        Self {
            algorithm,
            value: value.into(),
        }
    }
}

// Never print the stored value.
impl std::fmt::Debug for StoredPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredPassword")
            .field("algorithm", &self.algorithm)
            .field("value", &"***")
            .finish()
    }
}

/// Encodes and decodes reversible stored passwords.
#[derive(Clone)]
pub struct PasswordCipher {
    key: [u8; KEY_LENGTH],
}

impl PasswordCipher {
    /// Create a cipher from a 32-byte master key.
    pub fn new(master_key: [u8; KEY_LENGTH]) -> Result<Self, CipherError> {
        let hkdf = Hkdf::<Sha256>::new(None, &master_key);
        let mut key = [0u8; KEY_LENGTH];
        hkdf.expand(HKDF_INFO, &mut key)
            .map_err(|e| CipherError::InvalidKey {
                message: format!("key derivation failed: {e}"),
            })?;
        Ok(Self { key })
    }

    /// Create a cipher from a hex-encoded master key.
    pub fn from_hex(hex_key: &str) -> Result<Self, CipherError> {
        let bytes = hex::decode(hex_key).map_err(|e| CipherError::InvalidKey {
            message: format!("invalid hex key: {e}"),
        })?;
        Self::from_bytes(&bytes)
    }

    /// Create a cipher from a base64-encoded master key.
    pub fn from_base64(base64_key: &str) -> Result<Self, CipherError> {
        let bytes = STANDARD
            .decode(base64_key)
            .map_err(|e| CipherError::InvalidKey {
                message: format!("invalid base64 key: {e}"),
            })?;
        Self::from_bytes(&bytes)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CipherError> {
        if bytes.len() != KEY_LENGTH {
            return Err(CipherError::InvalidKey {
                message: format!("key must be {} bytes, got {}", KEY_LENGTH, bytes.len()),
            });
        }
        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(bytes);
        Self::new(key)
    }

    fn cipher(&self) -> Result<Aes256Gcm, CipherError> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|e| CipherError::InvalidKey {
            message: format!("failed to create cipher: {e}"),
        })
    }

    /// Encode a clear-text password with AES.
    pub fn encode(&self, clear: &str) -> Result<StoredPassword, CipherError> {
        let cipher = self.cipher()?;

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext =
            cipher
                .encrypt(nonce, clear.as_bytes())
                .map_err(|e| CipherError::EncryptionFailed {
                    message: e.to_string(),
                })?;

        let mut payload = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);
        Ok(StoredPassword::new(CipherAlgorithm::Aes, STANDARD.encode(payload)))
    }

    /// Recover the clear text of a stored password.
    pub fn decode(&self, stored: &StoredPassword) -> Result<String, CipherError> {
        if !stored.algorithm.is_reversible() {
            return Err(CipherError::NotReversible {
                algorithm: stored.algorithm,
            });
        }

        let payload = STANDARD
            .decode(&stored.value)
            .map_err(|e| CipherError::DecryptionFailed {
                message: format!("invalid base64 payload: {e}"),
            })?;
        if payload.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(CipherError::DecryptionFailed {
                message: "ciphertext too short".to_string(),
            });
        }

        let (nonce_bytes, encrypted) = payload.split_at(NONCE_LENGTH);
        let plaintext = self
            .cipher()?
            .decrypt(Nonce::from_slice(nonce_bytes), encrypted)
            .map_err(|e| CipherError::DecryptionFailed {
                message: e.to_string(),
            })?;

        String::from_utf8(plaintext).map_err(|e| CipherError::DecryptionFailed {
            message: format!("decrypted data is not valid UTF-8: {e}"),
        })
    }
}

impl std::fmt::Debug for PasswordCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordCipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> PasswordCipher {
        PasswordCipher::new([7u8; KEY_LENGTH]).unwrap()
    }

    #[test]
    fn test_encode_decode() {
        let cipher = cipher();
        let stored = cipher.encode("s3cret!").unwrap();
        assert_eq!(stored.algorithm, CipherAlgorithm::Aes);
        assert_ne!(stored.value, "s3cret!");
        assert_eq!(cipher.decode(&stored).unwrap(), "s3cret!");
    }

    #[test]
    fn test_nonce_is_random() {
        let cipher = cipher();
        let a = cipher.encode("same").unwrap();
        let b = cipher.encode("same").unwrap();
        assert_ne!(a.value, b.value);
    }

    #[test]
    fn test_wrong_key_fails() {
        let stored = cipher().encode("s3cret!").unwrap();
        let other = PasswordCipher::new([9u8; KEY_LENGTH]).unwrap();
        assert!(matches!(
            other.decode(&stored),
            Err(CipherError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn test_one_way_algorithms_are_rejected() {
        let stored = StoredPassword::new(CipherAlgorithm::Bcrypt, "$2a$10$abc");
        assert!(matches!(
            cipher().decode(&stored),
            Err(CipherError::NotReversible {
                algorithm: CipherAlgorithm::Bcrypt
            })
        ));
    }

    #[test]
    fn test_key_parsing() {
        assert!(PasswordCipher::from_hex(&"ab".repeat(32)).is_ok());
        assert!(PasswordCipher::from_hex("abcd").is_err());
        assert!(PasswordCipher::from_base64(&STANDARD.encode([1u8; 32])).is_ok());
        assert!(PasswordCipher::from_base64("not base64!").is_err());
    }

    #[test]
    fn test_debug_hides_value() {
        let stored = StoredPassword::new(CipherAlgorithm::Aes, "payload");
        assert!(!format!("{stored:?}").contains("payload"));
    }
}
