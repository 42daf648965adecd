//! # secure-store
//!
//! Secret storage for CLI credentials including:
//! - OS keyring as the primary backend, behind an injectable adapter
//! - AES-256-GCM encrypted file fallback with scrypt key derivation
//! - Cached availability probing with failure-driven invalidation
//! - A closed error taxonomy with fixed remediation guidance
//!
//! Storage failures always carry an [`ErrorCode`]. Caller mistakes do not:
//! [`Error::InvalidKeyName`] and [`Error::InvalidConfig`] are raised before
//! any backend is touched, and [`Error::code`] returns `None` for them.

pub mod classify;
pub mod config;
pub mod crypto;
pub mod error;
pub mod legacy;
mod probe;
pub mod storage;
mod store;
mod telemetry;
pub mod validation;

pub use config::{FallbackPolicy, StoreConfig};
pub use error::{Error, ErrorCode, Result, SecureStoreError};
pub use legacy::LegacyCredentialScan;
pub use probe::{ProbeResult, PROBE_KEY_PREFIX};
pub use storage::{
    disabled_loader, platform_loader, EncryptedFileStorage, KeyringAdapter, KeyringError,
    KeyringLoader, SecretStorage,
};
pub use store::SecureStore;
pub use telemetry::fingerprint;
pub use validation::validate_key_name;
