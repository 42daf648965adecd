//! AES-256-GCM authenticated encryption
//!
//! Fallback envelopes store `salt || iv || auth_tag || ciphertext`:
//! - IV: 12 bytes (96 bits) - standard for GCM
//! - Auth tag: 16 bytes (128 bits)
//! - Ciphertext: variable length

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use super::DerivedKey;
use crate::error::SecureStoreError;

/// GCM nonce length in bytes
pub const IV_LEN: usize = 12;

/// GCM authentication tag length in bytes
pub const AUTH_TAG_LEN: usize = 16;

/// Encrypted data with IV and auth tag
#[derive(Debug, Clone)]
pub struct EncryptedData {
    /// Initialization vector (12 bytes for GCM)
    pub iv: [u8; IV_LEN],
    /// Authentication tag (16 bytes)
    pub auth_tag: [u8; AUTH_TAG_LEN],
    /// Encrypted ciphertext
    pub ciphertext: Vec<u8>,
}

impl EncryptedData {
    /// Split `iv || auth_tag || ciphertext`
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < IV_LEN + AUTH_TAG_LEN {
            return None;
        }
        let (iv, rest) = bytes.split_at(IV_LEN);
        let (auth_tag, ciphertext) = rest.split_at(AUTH_TAG_LEN);

        Some(Self {
            iv: iv.try_into().ok()?,
            auth_tag: auth_tag.try_into().ok()?,
            ciphertext: ciphertext.to_vec(),
        })
    }

    /// Append `iv || auth_tag || ciphertext` to `out`
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.auth_tag);
        out.extend_from_slice(&self.ciphertext);
    }
}

/// Encrypt plaintext using AES-256-GCM with a random IV
pub fn encrypt(plaintext: &[u8], key: &DerivedKey) -> Result<EncryptedData, SecureStoreError> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| SecureStoreError::unavailable(format!("Encryption failed: {e}")))?;

    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    let nonce = Nonce::from_slice(&iv);

    // aes-gcm appends the auth tag to the ciphertext
    let ciphertext_with_tag = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| SecureStoreError::unavailable(format!("Encryption failed: {e}")))?;

    if ciphertext_with_tag.len() < AUTH_TAG_LEN {
        return Err(SecureStoreError::unavailable(
            "Encryption failed: ciphertext too short",
        ));
    }

    let tag_start = ciphertext_with_tag.len() - AUTH_TAG_LEN;
    let mut auth_tag = [0u8; AUTH_TAG_LEN];
    auth_tag.copy_from_slice(&ciphertext_with_tag[tag_start..]);

    Ok(EncryptedData {
        iv,
        auth_tag,
        ciphertext: ciphertext_with_tag[..tag_start].to_vec(),
    })
}

/// Decrypt and verify; any tag mismatch is reported as corruption
pub fn decrypt(encrypted: &EncryptedData, key: &DerivedKey) -> Result<Vec<u8>, SecureStoreError> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| SecureStoreError::corrupt(format!("Decryption failed: {e}")))?;

    let nonce = Nonce::from_slice(&encrypted.iv);

    let mut ciphertext_with_tag = encrypted.ciphertext.clone();
    ciphertext_with_tag.extend_from_slice(&encrypted.auth_tag);

    cipher
        .decrypt(nonce, ciphertext_with_tag.as_slice())
        .map_err(|_| SecureStoreError::corrupt("Decryption failed: authentication tag mismatch"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn test_key(byte: u8) -> DerivedKey {
        DerivedKey::new([byte; 32])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key(1);
        let plaintext = b"sk-proj-abc123xyz789";

        let encrypted = encrypt(plaintext, &key).unwrap();
        let decrypted = decrypt(&encrypted, &key).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_byte_layout() {
        let key = test_key(1);
        let encrypted = encrypt(b"value", &key).unwrap();

        let mut bytes = Vec::new();
        encrypted.write_to(&mut bytes);
        assert_eq!(bytes.len(), IV_LEN + AUTH_TAG_LEN + 5);

        let parsed = EncryptedData::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.iv, encrypted.iv);
        assert_eq!(parsed.auth_tag, encrypted.auth_tag);
        assert_eq!(decrypt(&parsed, &key).unwrap(), b"value");
    }

    #[test]
    fn test_short_input_rejected() {
        assert!(EncryptedData::from_bytes(&[0u8; IV_LEN + AUTH_TAG_LEN - 1]).is_none());
    }

    #[test]
    fn test_different_ivs_produce_different_ciphertext() {
        let key = test_key(1);

        let encrypted1 = encrypt(b"same plaintext", &key).unwrap();
        let encrypted2 = encrypt(b"same plaintext", &key).unwrap();

        assert_ne!(encrypted1.iv, encrypted2.iv);
        assert_ne!(encrypted1.ciphertext, encrypted2.ciphertext);
    }

    #[test]
    fn test_wrong_key_is_corrupt() {
        let encrypted = encrypt(b"secret data", &test_key(1)).unwrap();
        let err = decrypt(&encrypted, &test_key(2)).unwrap_err();

        assert_eq!(err.code, ErrorCode::Corrupt);
    }

    #[test]
    fn test_tampered_auth_tag_is_corrupt() {
        let key = test_key(1);
        let mut encrypted = encrypt(b"secret data", &key).unwrap();
        encrypted.auth_tag[0] ^= 0xFF;

        let err = decrypt(&encrypted, &key).unwrap_err();
        assert_eq!(err.code, ErrorCode::Corrupt);
    }
}
