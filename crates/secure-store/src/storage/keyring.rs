//! OS keyring adapter
//!
//! Wraps the system credential store behind [`KeyringAdapter`]:
//! - macOS: Keychain
//! - Windows: Credential Manager
//! - Linux: Secret Service (GNOME Keyring, KWallet)
//!
//! Adapter calls are blocking; the store runs them on the blocking pool.

use std::sync::Arc;
use std::time::Duration;

use keyring::Entry;
use thiserror::Error;
use tracing::debug;

/// Raw failure reported by a keyring adapter, before classification
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyringError {
    #[error("No matching entry found in secure storage")]
    NoEntry,

    #[error("Keyring is locked: {0}")]
    Locked(String),

    #[error("Access to keyring denied: {0}")]
    AccessDenied(String),

    #[error("Keyring not supported on this platform: {0}")]
    Unsupported(String),

    #[error("Keyring operation timed out")]
    Timeout,

    #[error("Keyring platform failure: {0}")]
    Platform(String),
}

/// Capability surface of a native credential store
///
/// `enumerate` is optional: adapters that cannot list entries keep the
/// default, which reports the capability as absent rather than failing.
pub trait KeyringAdapter: Send + Sync {
    /// Read a value; `Ok(None)` when no entry exists
    fn get(&self, service: &str, key: &str) -> Result<Option<String>, KeyringError>;

    /// Create or overwrite an entry
    fn set(&self, service: &str, key: &str, value: &str) -> Result<(), KeyringError>;

    /// Remove an entry; `Ok(false)` when there was nothing to remove
    fn delete(&self, service: &str, key: &str) -> Result<bool, KeyringError>;

    /// List entry names for a service, if the platform can
    fn enumerate(&self, _service: &str) -> Option<Result<Vec<String>, KeyringError>> {
        None
    }

    /// Human-readable backend name
    fn backend_name(&self) -> &'static str;
}

/// Resolves the adapter for a store; invoked at most once per store
pub type KeyringLoader =
    Arc<dyn Fn() -> Result<Arc<dyn KeyringAdapter>, KeyringError> + Send + Sync>;

/// Loader for the platform's native keyring
pub fn platform_loader() -> KeyringLoader {
    Arc::new(|| PlatformKeyring::load().map(|k| Arc::new(k) as Arc<dyn KeyringAdapter>))
}

/// Loader that always fails, for hosts where the keyring must not be touched
pub fn disabled_loader() -> KeyringLoader {
    Arc::new(|| Err(KeyringError::Unsupported("keyring disabled".to_string())))
}

/// Run a blocking adapter call on the blocking pool, bounded by `timeout`
///
/// An elapsed timeout reports [`KeyringError::Timeout`]; the detached call
/// is left to finish on its own.
pub(crate) async fn call_with_timeout<T, F>(
    adapter: Arc<dyn KeyringAdapter>,
    timeout: Duration,
    call: F,
) -> Result<T, KeyringError>
where
    T: Send + 'static,
    F: FnOnce(&dyn KeyringAdapter) -> Result<T, KeyringError> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(move || call(adapter.as_ref()));
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(KeyringError::Platform(format!("keyring task failed: {e}"))),
        Err(_) => Err(KeyringError::Timeout),
    }
}

/// Native keyring via the `keyring` crate
#[derive(Debug, Default)]
pub struct PlatformKeyring;

impl PlatformKeyring {
    /// Check that the platform has a credential store we can address
    pub fn load() -> Result<Self, KeyringError> {
        if !cfg!(any(
            target_os = "macos",
            target_os = "ios",
            target_os = "windows",
            target_os = "linux",
            target_os = "freebsd",
            target_os = "openbsd"
        )) {
            return Err(KeyringError::Unsupported(std::env::consts::OS.to_string()));
        }

        // Building an entry exercises the default credential builder
        Entry::new("secure-store", "__loader_check__").map_err(map_keyring_error)?;
        debug!("Platform keyring resolved");
        Ok(Self)
    }

    fn entry(service: &str, key: &str) -> Result<Entry, KeyringError> {
        Entry::new(service, key).map_err(map_keyring_error)
    }
}

impl KeyringAdapter for PlatformKeyring {
    fn get(&self, service: &str, key: &str) -> Result<Option<String>, KeyringError> {
        match Self::entry(service, key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(map_keyring_error(e)),
        }
    }

    fn set(&self, service: &str, key: &str, value: &str) -> Result<(), KeyringError> {
        Self::entry(service, key)?
            .set_password(value)
            .map_err(map_keyring_error)
    }

    fn delete(&self, service: &str, key: &str) -> Result<bool, KeyringError> {
        match Self::entry(service, key)?.delete_password() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(map_keyring_error(e)),
        }
    }

    fn backend_name(&self) -> &'static str {
        #[cfg(target_os = "macos")]
        return "macOS Keychain";

        #[cfg(target_os = "windows")]
        return "Windows Credential Manager";

        #[cfg(target_os = "linux")]
        return "Linux Secret Service";

        #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
        return "System Keychain";
    }
}

/// Translate `keyring` errors into explicit kinds where the crate offers them
fn map_keyring_error(err: keyring::Error) -> KeyringError {
    match err {
        keyring::Error::NoEntry => KeyringError::NoEntry,
        keyring::Error::NoStorageAccess(inner) => {
            let message = inner.to_string();
            if message.to_lowercase().contains("lock") {
                KeyringError::Locked(message)
            } else {
                KeyringError::AccessDenied(message)
            }
        }
        keyring::Error::PlatformFailure(inner) => KeyringError::Platform(inner.to_string()),
        other => KeyringError::Platform(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_loader_fails() {
        let loader = disabled_loader();
        assert!(matches!(loader(), Err(KeyringError::Unsupported(_))));
    }

    #[test]
    fn test_no_entry_maps_explicitly() {
        assert_eq!(map_keyring_error(keyring::Error::NoEntry), KeyringError::NoEntry);
    }

    #[test]
    fn test_platform_failure_keeps_message() {
        let err = keyring::Error::PlatformFailure("dbus connection refused".into());
        assert_eq!(
            map_keyring_error(err),
            KeyringError::Platform("dbus connection refused".to_string())
        );
    }

    #[test]
    fn test_default_enumerate_is_absent() {
        struct Minimal;
        impl KeyringAdapter for Minimal {
            fn get(&self, _: &str, _: &str) -> Result<Option<String>, KeyringError> {
                Ok(None)
            }
            fn set(&self, _: &str, _: &str, _: &str) -> Result<(), KeyringError> {
                Ok(())
            }
            fn delete(&self, _: &str, _: &str) -> Result<bool, KeyringError> {
                Ok(false)
            }
            fn backend_name(&self) -> &'static str {
                "minimal"
            }
        }
        assert!(Minimal.enumerate("svc").is_none());
    }
}
