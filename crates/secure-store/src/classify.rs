//! Maps raw keyring and filesystem failures into the error taxonomy
//!
//! Explicit kinds are used where the failure carries one; opaque platform
//! messages fall back to substring heuristics. Anything unrecognized is
//! `UNAVAILABLE`.

use std::io;

use crate::error::{ErrorCode, SecureStoreError};
use crate::storage::KeyringError;

const TIMEOUT_HINTS: &[&str] = &["timed out", "timeout", "deadline"];
const LOCKED_HINTS: &[&str] = &["locked", "unlock", "user interaction", "interaction not allowed"];
const DENIED_HINTS: &[&str] = &[
    "denied",
    "permission",
    "not allowed",
    "unauthorized",
    "not authorized",
];
const NOT_FOUND_HINTS: &[&str] = &["not found", "no entry", "no such", "could not be found"];
const CORRUPT_HINTS: &[&str] = &["corrupt", "malformed", "decrypt", "auth tag"];

/// Classify an opaque failure message
pub fn classify_message(message: &str) -> ErrorCode {
    let message = message.to_lowercase();
    let matches = |hints: &[&str]| hints.iter().any(|h| message.contains(h));

    if matches(TIMEOUT_HINTS) {
        ErrorCode::Timeout
    } else if matches(LOCKED_HINTS) {
        ErrorCode::Locked
    } else if matches(DENIED_HINTS) {
        ErrorCode::Denied
    } else if matches(NOT_FOUND_HINTS) {
        ErrorCode::NotFound
    } else if matches(CORRUPT_HINTS) {
        ErrorCode::Corrupt
    } else {
        ErrorCode::Unavailable
    }
}

/// Classify a keyring adapter failure
pub fn classify_keyring(err: &KeyringError) -> ErrorCode {
    match err {
        KeyringError::NoEntry => ErrorCode::NotFound,
        KeyringError::Locked(_) => ErrorCode::Locked,
        KeyringError::AccessDenied(_) => ErrorCode::Denied,
        KeyringError::Unsupported(_) => ErrorCode::Unavailable,
        KeyringError::Timeout => ErrorCode::Timeout,
        KeyringError::Platform(message) => classify_message(message),
    }
}

/// Classify a filesystem failure
pub fn classify_io(err: &io::Error) -> ErrorCode {
    match err.kind() {
        io::ErrorKind::NotFound => ErrorCode::NotFound,
        io::ErrorKind::PermissionDenied => ErrorCode::Denied,
        io::ErrorKind::TimedOut => ErrorCode::Timeout,
        io::ErrorKind::InvalidData => ErrorCode::Corrupt,
        _ => classify_message(&err.to_string()),
    }
}

impl From<KeyringError> for SecureStoreError {
    fn from(err: KeyringError) -> Self {
        SecureStoreError::new(classify_keyring(&err), err.to_string())
    }
}

impl From<io::Error> for SecureStoreError {
    fn from(err: io::Error) -> Self {
        SecureStoreError::new(classify_io(&err), format!("Fallback storage error: {err}"))
    }
}
