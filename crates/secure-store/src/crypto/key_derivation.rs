//! Machine-bound key derivation using scrypt
//!
//! The scrypt password is `<service>-<sha256(hostname + username)>`, so a
//! fallback file only decrypts on the machine and account that wrote it.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::error::SecureStoreError;

/// Derived key length in bytes (AES-256)
pub const KEY_LEN: usize = 32;

/// Random salt length in bytes
pub const SALT_LEN: usize = 16;

/// scrypt cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// CPU/memory cost, a power of two
    pub n: u32,
    /// Block size
    pub r: u32,
    /// Parallelism
    pub p: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            n: 16384,
            r: 8,
            p: 1,
        }
    }
}

/// Output of [`derive_key`]; wiped when dropped
#[derive(ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_LEN]);

impl DerivedKey {
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey(..)")
    }
}

/// Generate a cryptographically secure random salt
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Hex SHA-256 of hostname and username
pub fn machine_fingerprint() -> String {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "localhost".to_string());

    let username = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "user".to_string());

    hex::encode(Sha256::digest(format!("{hostname}{username}").as_bytes()))
}

/// scrypt input for a service on this machine
pub fn machine_secret(service: &str) -> Zeroizing<String> {
    Zeroizing::new(format!("{}-{}", service, machine_fingerprint()))
}

/// Derive a 256-bit key with scrypt
///
/// # Arguments
/// * `secret` - The scrypt password (see [`machine_secret`])
/// * `salt` - Per-file random salt
/// * `params` - Cost parameters; must be a power-of-two `n`
pub fn derive_key(
    secret: &str,
    salt: &[u8],
    params: KdfParams,
) -> Result<DerivedKey, SecureStoreError> {
    if !params.n.is_power_of_two() || params.n < 2 {
        return Err(SecureStoreError::unavailable(format!(
            "Key derivation failed: N={} is not a power of two",
            params.n
        )));
    }
    let log_n = params.n.trailing_zeros() as u8;

    let scrypt_params = scrypt::Params::new(log_n, params.r, params.p, KEY_LEN).map_err(|e| {
        SecureStoreError::unavailable(format!("Key derivation failed: {e}"))
    })?;

    let mut key_bytes = Zeroizing::new([0u8; KEY_LEN]);
    scrypt::scrypt(
        secret.as_bytes(),
        salt,
        &scrypt_params,
        key_bytes.as_mut_slice(),
    )
    .map_err(|e| SecureStoreError::unavailable(format!("Key derivation failed: {e}")))?;

    Ok(DerivedKey::new(*key_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Cheap parameters keep the unit tests fast
    const FAST: KdfParams = KdfParams { n: 1024, r: 8, p: 1 };

    #[test]
    fn test_generate_salt() {
        let salt1 = generate_salt();
        let salt2 = generate_salt();

        assert_ne!(salt1, salt2);
    }

    #[test]
    fn test_derive_key_deterministic() {
        let salt = generate_salt();

        let key1 = derive_key("demo-abc", &salt, FAST).unwrap();
        let key2 = derive_key("demo-abc", &salt, FAST).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_different_secrets() {
        let salt = generate_salt();

        let key1 = derive_key("demo-abc", &salt, FAST).unwrap();
        let key2 = derive_key("other-abc", &salt, FAST).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_different_salts() {
        let key1 = derive_key("demo-abc", &generate_salt(), FAST).unwrap();
        let key2 = derive_key("demo-abc", &generate_salt(), FAST).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_default_params() {
        let key = derive_key("demo-abc", &generate_salt(), KdfParams::default()).unwrap();
        assert_eq!(key.as_bytes().len(), KEY_LEN);
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        let params = KdfParams { n: 1000, r: 8, p: 1 };
        assert!(derive_key("demo-abc", &generate_salt(), params).is_err());
    }

    #[test]
    fn test_derived_key_debug_hides_bytes() {
        let key = derive_key("demo-abc", &[9u8; SALT_LEN], FAST).unwrap();
        assert_eq!(format!("{key:?}"), "DerivedKey(..)");
    }

    #[test]
    fn test_machine_secret_shape() {
        let fingerprint = machine_fingerprint();
        assert_eq!(fingerprint.len(), 64);
        assert_eq!(fingerprint, machine_fingerprint());

        let secret = machine_secret("demo");
        assert_eq!(secret.as_str(), format!("demo-{fingerprint}"));
    }
}
