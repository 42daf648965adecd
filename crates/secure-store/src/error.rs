//! Error types for secure-store
//!
//! Every storage failure surfaces as a [`SecureStoreError`] tagged with one
//! code from the closed [`ErrorCode`] taxonomy. Raw keyring and filesystem
//! failures are mapped into it by [`crate::classify`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Closed set of failure categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No usable backend (keyring missing/broken, or fallback refused by policy)
    Unavailable,
    /// The keyring exists but is locked
    Locked,
    /// The OS refused access to the keyring or the fallback files
    Denied,
    /// A fallback file failed version, schema or integrity checks
    Corrupt,
    /// A keyring call did not complete in time
    Timeout,
    /// The requested entry does not exist
    NotFound,
}

impl ErrorCode {
    /// All codes, in declaration order
    pub const ALL: [ErrorCode; 6] = [
        ErrorCode::Unavailable,
        ErrorCode::Locked,
        ErrorCode::Denied,
        ErrorCode::Corrupt,
        ErrorCode::Timeout,
        ErrorCode::NotFound,
    ];

    /// Stable identifier used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unavailable => "UNAVAILABLE",
            ErrorCode::Locked => "LOCKED",
            ErrorCode::Denied => "DENIED",
            ErrorCode::Corrupt => "CORRUPT",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::NotFound => "NOT_FOUND",
        }
    }

    /// Fixed remediation guidance shown to the user
    pub fn remediation(&self) -> &'static str {
        match self {
            ErrorCode::Unavailable => {
                "Use --key, install a system keyring (GNOME Keyring, KWallet, macOS Keychain, \
                 Windows Credential Manager), or allow the encrypted file fallback"
            }
            ErrorCode::Locked => "Unlock your keyring and try again",
            ErrorCode::Denied => {
                "Check that this user may access the system keyring and the fallback directory"
            }
            ErrorCode::Corrupt => "Re-save the key with /key save <name> <key>",
            ErrorCode::Timeout => "The keyring did not respond in time; retry the operation",
            ErrorCode::NotFound => "Save the key first with /key save <name> <key>",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified storage failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct SecureStoreError {
    /// Taxonomy code
    pub code: ErrorCode,
    /// What went wrong (never contains secret values)
    pub message: String,
    /// What the user can do about it
    pub remediation: &'static str,
}

impl SecureStoreError {
    /// Create an error; the remediation text is fixed by the code
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            remediation: code.remediation(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unavailable, message)
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Corrupt, message)
    }
}

/// Top-level error returned by [`crate::SecureStore`]
///
/// Only [`Error::Store`] belongs to the taxonomy. The argument variants have
/// no code or remediation text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The key name was rejected before any I/O
    #[error("Invalid key name {name:?}: {reason}")]
    InvalidKeyName { name: String, reason: &'static str },

    /// The store was constructed with unusable settings
    #[error("Invalid store configuration: {0}")]
    InvalidConfig(String),

    /// A classified storage failure
    #[error(transparent)]
    Store(#[from] SecureStoreError),
}

impl Error {
    /// Taxonomy code, if this is a storage failure
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Error::InvalidKeyName { .. } | Error::InvalidConfig(_) => None,
            Error::Store(e) => Some(e.code),
        }
    }

    /// Remediation text, if this is a storage failure
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Error::InvalidKeyName { .. } | Error::InvalidConfig(_) => None,
            Error::Store(e) => Some(e.remediation),
        }
    }
}
