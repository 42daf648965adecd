//! Key name validation
//!
//! Names must match `^[A-Za-z0-9._-]{1,64}$`. They are case-sensitive and
//! never normalized; some keyrings compare case-insensitively, so `Foo` and
//! `foo` may collide there.

use crate::error::{Error, Result};

/// Maximum key name length
pub const MAX_KEY_LEN: usize = 64;

/// Check a key name before it touches any backend
pub fn validate_key_name(name: &str) -> Result<()> {
    match rejection_reason(name) {
        None => Ok(()),
        Some(reason) => Err(Error::InvalidKeyName {
            name: name.to_string(),
            reason,
        }),
    }
}

/// Whether `name` is a valid key name
pub fn is_valid_key_name(name: &str) -> bool {
    rejection_reason(name).is_none()
}

fn rejection_reason(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        return Some("must not be empty");
    }
    if name.len() > MAX_KEY_LEN {
        return Some("must be at most 64 characters");
    }
    if name.contains('\0') {
        return Some("contains a null byte");
    }
    if name.contains('/') || name.contains('\\') {
        return Some("contains a path separator");
    }
    if name == "." || name == ".." {
        return Some("is a relative path component");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Some("may only contain letters, digits, '.', '_' and '-'");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_valid_names() {
        let longest = "x".repeat(MAX_KEY_LEN);
        for name in ["a", "alpha", "OPENAI_KEY", "my.key-1", longest.as_str()] {
            assert!(validate_key_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_rejects_invalid_names() {
        let long = "x".repeat(MAX_KEY_LEN + 1);
        for name in ["", long.as_str(), "a/b", "a\\b", "..", ".", "nul\0byte", "spa ce", "ünï"] {
            assert!(validate_key_name(name).is_err(), "{name:?}");
        }
    }

    #[test]
    fn test_case_preserved() {
        assert!(is_valid_key_name("Alpha"));
        assert!(is_valid_key_name("alpha"));
    }

    #[test]
    fn test_error_names_reason() {
        let err = validate_key_name("../etc").unwrap_err();
        assert!(err.to_string().contains("path separator"));
    }
}
