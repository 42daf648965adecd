//! Cryptographic primitives for the encrypted file fallback
//!
//! This module provides:
//! - AES-256-GCM authenticated encryption
//! - scrypt key derivation bound to the current machine and user
//! - Key material that is zeroized on drop

mod encryption;
mod key_derivation;

pub use encryption::{decrypt, encrypt, EncryptedData, AUTH_TAG_LEN, IV_LEN};
pub use key_derivation::{
    derive_key, generate_salt, machine_fingerprint, machine_secret, DerivedKey, KdfParams, KEY_LEN,
    SALT_LEN,
};
