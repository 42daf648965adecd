//! Keyring availability probing
//!
//! Only a live round trip tells a working keyring apart from a locked one or
//! a dead daemon. Results are cached for a TTL; timeouts and a run of
//! consecutive keyring failures drop the cached result early.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::sync::Mutex;
use tracing::debug;

use crate::classify::classify_keyring;
use crate::error::ErrorCode;
use crate::storage::keyring::call_with_timeout;
use crate::storage::{KeyringAdapter, KeyringError};

/// Prefix of disposable probe entries; never reported by `list`
pub const PROBE_KEY_PREFIX: &str = "__secure_store_probe_";

/// A cached probe outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub available: bool,
    pub captured_at: Instant,
}

/// Probe cache plus the consecutive-failure counter
#[derive(Debug)]
pub(crate) struct ProbeState {
    cache: Mutex<Option<ProbeResult>>,
    failures: AtomicU32,
    ttl: Duration,
    threshold: u32,
}

impl ProbeState {
    pub(crate) fn new(ttl: Duration, threshold: u32) -> Self {
        Self {
            cache: Mutex::new(None),
            failures: AtomicU32::new(0),
            ttl,
            threshold: threshold.max(1),
        }
    }

    /// Cached availability, if still within the TTL
    pub(crate) async fn cached(&self) -> Option<bool> {
        let cache = self.cache.lock().await;
        cache
            .filter(|result| result.captured_at.elapsed() < self.ttl)
            .map(|result| result.available)
    }

    pub(crate) async fn store(&self, available: bool) {
        let mut cache = self.cache.lock().await;
        *cache = Some(ProbeResult {
            available,
            captured_at: Instant::now(),
        });
    }

    pub(crate) async fn invalidate(&self) {
        let mut cache = self.cache.lock().await;
        *cache = None;
    }

    /// A keyring call succeeded
    pub(crate) fn record_success(&self) {
        self.failures.store(0, Ordering::SeqCst);
    }

    /// A keyring call failed; returns its taxonomy code
    pub(crate) async fn record_failure(&self, err: &KeyringError) -> ErrorCode {
        let code = classify_keyring(err);
        if code == ErrorCode::Timeout {
            debug!("Keyring timed out, dropping probe cache");
            self.invalidate().await;
        }

        let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.threshold {
            debug!(failures, "Consecutive keyring failures, dropping probe cache");
            self.failures.store(0, Ordering::SeqCst);
            self.invalidate().await;
        }
        code
    }

    #[cfg(test)]
    pub(crate) fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) async fn snapshot(&self) -> Option<ProbeResult> {
        *self.cache.lock().await
    }
}

/// Random name for a disposable probe entry
pub(crate) fn probe_key_name() -> String {
    format!("{PROBE_KEY_PREFIX}{}", uuid::Uuid::new_v4().simple())
}

/// Write, read back and delete a disposable entry
///
/// `Ok(false)` means the keyring answered but returned the wrong value.
pub(crate) async fn round_trip(
    adapter: Arc<dyn KeyringAdapter>,
    service: &str,
    timeout: Duration,
) -> Result<bool, KeyringError> {
    let service = service.to_string();
    let key = probe_key_name();
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();

    call_with_timeout(adapter, timeout, move |keyring| {
        keyring.set(&service, &key, &token)?;
        let read_back = keyring.get(&service, &key);
        let deleted = keyring.delete(&service, &key);
        let matches = read_back?.as_deref() == Some(token.as_str());
        deleted?;
        Ok(matches)
    })
    .await
}
