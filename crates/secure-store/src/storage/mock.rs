//! In-memory keyring adapter for tests
//!
//! Never touches the real platform store. Failure modes can be flipped at
//! runtime to simulate a keyring that degrades mid-session.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::keyring::{KeyringAdapter, KeyringError, KeyringLoader};

/// How the mock behaves on each call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MockBehavior {
    /// Normal in-memory operation
    #[default]
    Working,
    /// Every call fails as if the daemon were gone
    Unavailable,
    /// Every call fails with a locked keyring
    Locked,
    /// Every call fails with access denied
    Denied,
    /// Writes succeed but reads return a different value
    Garbled,
    /// Every call blocks for the given duration before working normally
    Slow(Duration),
}

#[derive(Debug, Default)]
pub struct MockKeyring {
    entries: Mutex<BTreeMap<(String, String), String>>,
    behavior: Mutex<MockBehavior>,
    enumerable: bool,
    set_calls: AtomicUsize,
    get_calls: AtomicUsize,
}

impl MockKeyring {
    /// A working keyring without enumeration support
    pub fn new() -> Self {
        Self::default()
    }

    /// A working keyring that can list its entries
    pub fn with_enumeration() -> Self {
        Self {
            enumerable: true,
            ..Self::default()
        }
    }

    /// Loader handing out this instance
    pub fn loader(self: &Arc<Self>) -> KeyringLoader {
        let keyring = Arc::clone(self);
        Arc::new(move || Ok(Arc::clone(&keyring) as Arc<dyn KeyringAdapter>))
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        *lock(&self.behavior) = behavior;
    }

    /// Seed an entry directly, bypassing behavior
    pub fn insert(&self, service: &str, key: &str, value: &str) {
        lock(&self.entries).insert((service.to_string(), key.to_string()), value.to_string());
    }

    /// Inspect an entry directly, bypassing behavior
    pub fn value(&self, service: &str, key: &str) -> Option<String> {
        lock(&self.entries)
            .get(&(service.to_string(), key.to_string()))
            .cloned()
    }

    /// Number of stored entries across all services
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count of `set` calls, including probe writes
    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<MockBehavior, KeyringError> {
        let behavior = lock(&self.behavior).clone();
        match behavior {
            MockBehavior::Unavailable => Err(KeyringError::Platform(
                "The name org.freedesktop.secrets was not provided by any .service files"
                    .to_string(),
            )),
            MockBehavior::Locked => Err(KeyringError::Locked("collection is locked".to_string())),
            MockBehavior::Denied => {
                Err(KeyringError::AccessDenied("user denied access".to_string()))
            }
            MockBehavior::Slow(delay) => {
                std::thread::sleep(delay);
                Ok(behavior)
            }
            other => Ok(other),
        }
    }
}

impl KeyringAdapter for MockKeyring {
    fn get(&self, service: &str, key: &str) -> Result<Option<String>, KeyringError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.check()?;
        let value = self.value(service, key);
        if behavior == MockBehavior::Garbled {
            return Ok(value.map(|v| format!("{v}~garbled")));
        }
        Ok(value)
    }

    fn set(&self, service: &str, key: &str, value: &str) -> Result<(), KeyringError> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.insert(service, key, value);
        Ok(())
    }

    fn delete(&self, service: &str, key: &str) -> Result<bool, KeyringError> {
        self.check()?;
        Ok(lock(&self.entries)
            .remove(&(service.to_string(), key.to_string()))
            .is_some())
    }

    fn enumerate(&self, service: &str) -> Option<Result<Vec<String>, KeyringError>> {
        if !self.enumerable {
            return None;
        }
        Some(self.check().map(|_| {
            lock(&self.entries)
                .keys()
                .filter(|(s, _)| s == service)
                .map(|(_, k)| k.clone())
                .collect()
        }))
    }

    fn backend_name(&self) -> &'static str {
        "Mock Keyring"
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
