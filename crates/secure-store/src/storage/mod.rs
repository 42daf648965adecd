//! Storage backends for secret persistence
//!
//! This module provides two storage backends:
//! 1. OS keyring (behind the [`KeyringAdapter`] capability trait)
//! 2. Encrypted files (fallback)

mod encrypted_file;
pub(crate) mod keyring;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod traits;

pub use encrypted_file::{EncryptedFileStorage, ENVELOPE_VERSION, FILE_EXTENSION};
pub use self::keyring::{
    disabled_loader, platform_loader, KeyringAdapter, KeyringError, KeyringLoader,
    PlatformKeyring,
};
pub use traits::SecretStorage;
