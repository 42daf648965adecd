//! Secure store orchestration
//!
//! Composes the keyring adapter, the availability prober and the encrypted
//! file backend:
//! - writes go to the keyring when a probe says it works, else to the file
//!   fallback (unless the policy denies it)
//! - reads always try the keyring first; its value wins over the fallback
//! - every failure is classified before it reaches the caller

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::classify::classify_keyring;
use crate::config::{FallbackPolicy, StoreConfig};
use crate::error::{Error, ErrorCode, Result, SecureStoreError};
use crate::legacy::LegacyCredentialScan;
use crate::probe::{round_trip, ProbeState, PROBE_KEY_PREFIX};
use crate::storage::keyring::call_with_timeout;
use crate::storage::{
    platform_loader, EncryptedFileStorage, KeyringAdapter, KeyringError, KeyringLoader,
    SecretStorage,
};
use crate::telemetry::OpRecord;
use crate::validation::{is_valid_key_name, validate_key_name};

/// Keyring-first secret store with an encrypted file fallback
pub struct SecureStore {
    config: StoreConfig,
    /// Encrypted file fallback
    files: EncryptedFileStorage,
    /// Resolves the keyring adapter on first use
    loader: KeyringLoader,
    /// Resolved adapter; `None` once resolution has failed for good
    keyring: OnceLock<Option<Arc<dyn KeyringAdapter>>>,
    probe: ProbeState,
    legacy_checked: AtomicBool,
}

impl SecureStore {
    /// Store for a service with default settings and the platform keyring
    pub fn new(service_name: impl Into<String>) -> Result<Self> {
        Self::with_config(StoreConfig::new(service_name))
    }

    /// Store with explicit settings and the platform keyring
    pub fn with_config(config: StoreConfig) -> Result<Self> {
        Self::with_keyring_loader(config, platform_loader())
    }

    /// Store with explicit settings and a custom keyring loader
    pub fn with_keyring_loader(config: StoreConfig, loader: KeyringLoader) -> Result<Self> {
        if config.service_name.is_empty() {
            return Err(Error::InvalidConfig(
                "service name must not be empty".to_string(),
            ));
        }

        let fallback_dir = config.resolved_fallback_dir()?;
        let files = EncryptedFileStorage::new(fallback_dir, config.service_name.clone());
        let probe = ProbeState::new(config.probe_ttl(), config.failure_threshold);

        debug!(
            service = %config.service_name,
            policy = %config.fallback_policy,
            "Secure store initialized at: {:?}",
            files.dir()
        );

        Ok(Self {
            config,
            files,
            loader,
            keyring: OnceLock::new(),
            probe,
            legacy_checked: AtomicBool::new(false),
        })
    }

    pub fn service_name(&self) -> &str {
        &self.config.service_name
    }

    pub fn fallback_dir(&self) -> &Path {
        self.files.dir()
    }

    pub fn fallback_policy(&self) -> FallbackPolicy {
        self.config.fallback_policy
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Resolve the keyring adapter, once per store
    fn keyring(&self) -> Option<Arc<dyn KeyringAdapter>> {
        self.keyring
            .get_or_init(|| match (self.loader)() {
                Ok(adapter) => {
                    debug!(backend = adapter.backend_name(), "Keyring adapter resolved");
                    Some(adapter)
                }
                Err(e) => {
                    warn!(error = %e, "Keyring unavailable - will use encrypted file fallback");
                    None
                }
            })
            .clone()
    }

    /// Run one blocking keyring call under the configured timeout
    async fn keyring_call<T, F>(
        &self,
        adapter: Arc<dyn KeyringAdapter>,
        call: F,
    ) -> std::result::Result<T, KeyringError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn KeyringAdapter, &str) -> std::result::Result<T, KeyringError>
            + Send
            + 'static,
    {
        let service = self.config.service_name.clone();
        call_with_timeout(adapter, self.config.keyring_timeout(), move |keyring| {
            call(keyring, &service)
        })
        .await
    }

    /// Classify a file backend failure, dropping the probe cache on timeouts
    async fn file_failure(&self, record: &OpRecord, err: Error) -> Error {
        if err.code() == Some(ErrorCode::Timeout) {
            self.probe.invalidate().await;
        }
        record.fail(err)
    }

    /// Whether the keyring currently works, from cache or a live round trip
    pub async fn probe(&self) -> bool {
        let record = OpRecord::start("probe", None);

        if let Some(available) = self.probe.cached().await {
            record.ok(if available { "cached-available" } else { "cached-unavailable" });
            return available;
        }

        let Some(adapter) = self.keyring() else {
            self.probe.store(false).await;
            record.ok("no-keyring");
            return false;
        };

        match round_trip(adapter, &self.config.service_name, self.config.keyring_timeout()).await {
            Ok(available) => {
                if available {
                    self.probe.record_success();
                }
                self.probe.store(available).await;
                record.ok(if available { "available" } else { "mismatch" });
                available
            }
            Err(e) => {
                let code = classify_keyring(&e);
                if code == ErrorCode::Timeout {
                    self.probe.invalidate().await;
                } else {
                    self.probe.store(false).await;
                }
                record.ok(code.as_str());
                false
            }
        }
    }

    /// Store a secret
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let record = OpRecord::start("set", Some(key));
        validate_key_name(key).map_err(|e| record.fail(e))?;

        if self.probe().await {
            if let Some(adapter) = self.keyring() {
                let name = key.to_string();
                let secret = Zeroizing::new(value.to_string());
                let written = self
                    .keyring_call(adapter, move |keyring, service| {
                        keyring.set(service, &name, &secret)
                    })
                    .await;

                match written {
                    Ok(()) => {
                        self.probe.record_success();
                        record.ok("keyring");
                        return Ok(());
                    }
                    Err(e) => {
                        let code = self.probe.record_failure(&e).await;
                        record.keyring_failed(code);
                    }
                }
            }
        }

        if self.config.fallback_policy == FallbackPolicy::Deny {
            return Err(record.fail(
                SecureStoreError::unavailable(
                    "Keyring is unavailable and the encrypted file fallback is disabled",
                )
                .into(),
            ));
        }

        if let Err(e) = self.files.write(key, value).await {
            return Err(self.file_failure(&record, e).await);
        }
        record.ok("file");
        Ok(())
    }

    /// Retrieve a secret; the keyring's value wins over the fallback
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let record = OpRecord::start("get", Some(key));
        validate_key_name(key).map_err(|e| record.fail(e))?;

        // Not gated on the cached probe: a stale "unavailable" must not hide a
        // keyring that works again
        if let Some(adapter) = self.keyring() {
            let name = key.to_string();
            match self
                .keyring_call(adapter, move |keyring, service| keyring.get(service, &name))
                .await
            {
                Ok(Some(value)) => {
                    self.probe.record_success();
                    record.ok("keyring");
                    return Ok(Some(value));
                }
                Ok(None) => self.probe.record_success(),
                Err(e) => {
                    let code = self.probe.record_failure(&e).await;
                    record.keyring_failed(code);
                }
            }
        }

        match self.files.read(key).await {
            Ok(Some(value)) => {
                record.ok("file");
                Ok(Some(value))
            }
            Ok(None) => {
                record.ok("absent");
                Ok(None)
            }
            Err(e) => Err(self.file_failure(&record, e).await),
        }
    }

    /// Remove a secret from both backends; `true` if either held it
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let record = OpRecord::start("delete", Some(key));
        validate_key_name(key).map_err(|e| record.fail(e))?;

        let mut removed = false;

        if let Some(adapter) = self.keyring() {
            let name = key.to_string();
            match self
                .keyring_call(adapter, move |keyring, service| keyring.delete(service, &name))
                .await
            {
                Ok(deleted) => {
                    self.probe.record_success();
                    removed |= deleted;
                }
                Err(e) => {
                    let code = self.probe.record_failure(&e).await;
                    record.keyring_failed(code);
                }
            }
        }

        match self.files.remove(key).await {
            Ok(deleted) => removed |= deleted,
            Err(e) => return Err(self.file_failure(&record, e).await),
        }

        record.ok(if removed { "removed" } else { "absent" });
        Ok(removed)
    }

    /// Every stored key name across both backends, sorted
    pub async fn list(&self) -> Result<Vec<String>> {
        let record = OpRecord::start("list", None);
        let mut keys = BTreeSet::new();

        if let Some(adapter) = self.keyring() {
            let listed = self
                .keyring_call(adapter, |keyring, service| Ok(keyring.enumerate(service)))
                .await;

            match listed {
                Ok(None) => debug!("Keyring cannot enumerate entries"),
                Ok(Some(Ok(names))) => {
                    self.probe.record_success();
                    for name in names {
                        if name.starts_with(PROBE_KEY_PREFIX) {
                            continue;
                        }
                        if !is_valid_key_name(&name) {
                            debug!("Skipping keyring entry with malformed key name");
                            continue;
                        }
                        keys.insert(name);
                    }
                }
                Ok(Some(Err(e))) | Err(e) => {
                    let code = self.probe.record_failure(&e).await;
                    record.keyring_failed(code);
                }
            }
        }

        match self.files.list().await {
            Ok(names) => keys.extend(names),
            Err(e) => return Err(self.file_failure(&record, e).await),
        }

        record.ok("listed");
        Ok(keys.into_iter().collect())
    }

    /// Whether a secret exists
    ///
    /// Keyring errors other than `NOT_FOUND` propagate, so "absent" always
    /// means confirmed absent.
    pub async fn has(&self, key: &str) -> Result<bool> {
        let record = OpRecord::start("has", Some(key));
        validate_key_name(key).map_err(|e| record.fail(e))?;

        if let Some(adapter) = self.keyring() {
            let name = key.to_string();
            match self
                .keyring_call(adapter, move |keyring, service| {
                    keyring.get(service, &name).map(|value| value.is_some())
                })
                .await
            {
                Ok(true) => {
                    self.probe.record_success();
                    record.ok("keyring");
                    return Ok(true);
                }
                Ok(false) => self.probe.record_success(),
                Err(e) => {
                    let code = self.probe.record_failure(&e).await;
                    if code != ErrorCode::NotFound {
                        return Err(record.fail(SecureStoreError::from(e).into()));
                    }
                }
            }
        }

        match self.files.exists(key).await {
            Ok(exists) => {
                record.ok(if exists { "file" } else { "absent" });
                Ok(exists)
            }
            Err(e) => Err(self.file_failure(&record, e).await),
        }
    }

    /// Warn once about legacy credential files at well-known paths
    pub fn check_legacy_credentials(&self) -> Vec<PathBuf> {
        if self.legacy_checked.swap(true, Ordering::SeqCst) {
            return Vec::new();
        }
        LegacyCredentialScan::for_service(&self.config.service_name).scan()
    }
}

impl std::fmt::Debug for SecureStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureStore")
            .field("service_name", &self.config.service_name)
            .field("fallback_dir", &self.files.dir())
            .field("fallback_policy", &self.config.fallback_policy)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SecretStorage for SecureStore {
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        SecureStore::set(self, key, value).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        SecureStore::get(self, key).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        SecureStore::delete(self, key).await
    }

    async fn list(&self) -> Result<Vec<String>> {
        SecureStore::list(self).await
    }

    async fn has(&self, key: &str) -> Result<bool> {
        SecureStore::has(self, key).await
    }

    async fn probe(&self) -> bool {
        SecureStore::probe(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::disabled_loader;
    use crate::storage::mock::{MockBehavior, MockKeyring};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir) -> StoreConfig {
        StoreConfig::new("demo").with_fallback_dir(temp_dir.path().join("demo"))
    }

    fn store_with(keyring: &Arc<MockKeyring>, config: StoreConfig) -> SecureStore {
        SecureStore::with_keyring_loader(config, keyring.loader()).unwrap()
    }

    fn mock_store() -> (TempDir, Arc<MockKeyring>, SecureStore) {
        let temp_dir = TempDir::new().unwrap();
        let keyring = Arc::new(MockKeyring::new());
        let store = store_with(&keyring, test_config(&temp_dir));
        (temp_dir, keyring, store)
    }

    fn file_store(store: &SecureStore) -> EncryptedFileStorage {
        EncryptedFileStorage::new(store.fallback_dir(), "demo")
    }

    #[tokio::test]
    async fn test_roundtrip_with_keyring() {
        let (_tmp, keyring, store) = mock_store();

        store.set("alpha", "v1").await.unwrap();

        assert_eq!(store.get("alpha").await.unwrap(), Some("v1".to_string()));
        assert_eq!(keyring.value("demo", "alpha"), Some("v1".to_string()));
        assert!(!store.fallback_dir().join("alpha.enc").exists());
    }

    #[tokio::test]
    async fn test_roundtrip_without_keyring() {
        let temp_dir = TempDir::new().unwrap();
        let store =
            SecureStore::with_keyring_loader(test_config(&temp_dir), disabled_loader()).unwrap();

        store.set("alpha", "v1").await.unwrap();

        assert_eq!(store.get("alpha").await.unwrap(), Some("v1".to_string()));
        assert!(store.fallback_dir().join("alpha.enc").exists());
        assert!(!store.probe().await);
    }

    #[tokio::test]
    async fn test_roundtrip_with_broken_keyring() {
        let (_tmp, keyring, store) = mock_store();
        keyring.set_behavior(MockBehavior::Unavailable);

        store.set("alpha", "sk-proj-abc").await.unwrap();

        assert_eq!(
            store.get("alpha").await.unwrap(),
            Some("sk-proj-abc".to_string())
        );
        assert!(keyring.is_empty());
    }

    #[tokio::test]
    async fn test_keyring_value_wins() {
        let (_tmp, keyring, store) = mock_store();
        keyring.insert("demo", "alpha", "from-keyring");
        file_store(&store).write("alpha", "from-file").await.unwrap();

        assert_eq!(
            store.get("alpha").await.unwrap(),
            Some("from-keyring".to_string())
        );
    }

    #[tokio::test]
    async fn test_get_ignores_stale_unavailable_probe() {
        let (_tmp, keyring, store) = mock_store();
        keyring.set_behavior(MockBehavior::Unavailable);
        assert!(!store.probe().await);

        keyring.set_behavior(MockBehavior::Working);
        keyring.insert("demo", "alpha", "v1");

        assert_eq!(store.get("alpha").await.unwrap(), Some("v1".to_string()));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_tmp, keyring, store) = mock_store();

        assert!(!store.delete("alpha").await.unwrap());

        store.set("alpha", "v1").await.unwrap();
        assert!(store.delete("alpha").await.unwrap());
        assert!(!store.delete("alpha").await.unwrap());

        keyring.set_behavior(MockBehavior::Unavailable);
        assert!(!store.delete("alpha").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_removes_from_both_backends() {
        let (_tmp, keyring, store) = mock_store();
        keyring.insert("demo", "alpha", "v2");
        file_store(&store).write("alpha", "v1").await.unwrap();

        assert!(store.delete("alpha").await.unwrap());

        assert_eq!(keyring.value("demo", "alpha"), None);
        assert!(!store.fallback_dir().join("alpha.enc").exists());
        assert_eq!(store.get("alpha").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_file_raises() {
        let temp_dir = TempDir::new().unwrap();
        let store =
            SecureStore::with_keyring_loader(test_config(&temp_dir), disabled_loader()).unwrap();
        store.set("alpha", "v1").await.unwrap();

        let path = store.fallback_dir().join("alpha.enc");
        let raw = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, raw.replace("\"v\": 1", "\"v\": 9")).unwrap();

        let err = store.get("alpha").await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Corrupt));
        assert_eq!(err.remediation(), Some(ErrorCode::Corrupt.remediation()));
    }

    #[tokio::test]
    async fn test_probe_cached_within_ttl() {
        let (_tmp, keyring, store) = mock_store();

        assert!(store.probe().await);
        assert!(store.probe().await);

        assert_eq!(keyring.set_calls(), 1);
    }

    #[tokio::test]
    async fn test_probe_repeats_after_ttl() {
        let temp_dir = TempDir::new().unwrap();
        let keyring = Arc::new(MockKeyring::new());
        let mut config = test_config(&temp_dir);
        config.probe_ttl_ms = 50;
        let store = store_with(&keyring, config);

        assert!(store.probe().await);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(store.probe().await);

        assert_eq!(keyring.set_calls(), 2);
    }

    #[tokio::test]
    async fn test_probe_timeout_forces_reprobe() {
        let temp_dir = TempDir::new().unwrap();
        let keyring = Arc::new(MockKeyring::new());
        keyring.set_behavior(MockBehavior::Slow(Duration::from_millis(200)));
        let mut config = test_config(&temp_dir);
        config.keyring_timeout_ms = 20;
        let store = store_with(&keyring, config);

        assert!(!store.probe().await);
        assert_eq!(store.probe.snapshot().await, None);

        keyring.set_behavior(MockBehavior::Working);
        assert!(store.probe().await);
    }

    #[tokio::test]
    async fn test_repeated_failures_force_reprobe() {
        let (_tmp, keyring, store) = mock_store();
        assert!(store.probe().await);
        assert_eq!(keyring.set_calls(), 1);

        keyring.set_behavior(MockBehavior::Unavailable);
        for _ in 0..3 {
            assert_eq!(store.get("alpha").await.unwrap(), None);
        }

        assert!(!store.probe().await);
        assert_eq!(keyring.set_calls(), 2);
    }

    #[tokio::test]
    async fn test_deny_policy_refuses_fallback() {
        let temp_dir = TempDir::new().unwrap();
        let keyring = Arc::new(MockKeyring::new());
        keyring.set_behavior(MockBehavior::Unavailable);
        let config = test_config(&temp_dir).with_fallback_policy(FallbackPolicy::Deny);
        let store = store_with(&keyring, config);

        let err = store.set("alpha", "v1").await.unwrap_err();

        assert_eq!(err.code(), Some(ErrorCode::Unavailable));
        assert!(!store.fallback_dir().join("alpha.enc").exists());
    }

    #[tokio::test]
    async fn test_write_failure_mid_session_falls_back() {
        let (_tmp, keyring, store) = mock_store();
        assert!(store.probe().await);

        keyring.set_behavior(MockBehavior::Locked);
        store.set("alpha", "v1").await.unwrap();

        assert!(store.fallback_dir().join("alpha.enc").exists());
        keyring.set_behavior(MockBehavior::Working);
        assert_eq!(store.get("alpha").await.unwrap(), Some("v1".to_string()));
    }

    #[tokio::test]
    async fn test_scenario_keyring_recovers() {
        let temp_dir = TempDir::new().unwrap();
        let keyring = Arc::new(MockKeyring::new());
        keyring.set_behavior(MockBehavior::Unavailable);
        let mut config = test_config(&temp_dir);
        config.probe_ttl_ms = 50;
        let store = store_with(&keyring, config);

        store.set("alpha", "v1").await.unwrap();
        assert!(temp_dir.path().join("demo").join("alpha.enc").exists());
        assert_eq!(store.get("alpha").await.unwrap(), Some("v1".to_string()));

        keyring.set_behavior(MockBehavior::Working);
        tokio::time::sleep(Duration::from_millis(80)).await;

        store.set("alpha", "v2").await.unwrap();
        assert_eq!(store.get("alpha").await.unwrap(), Some("v2".to_string()));
        assert_eq!(
            file_store(&store).read("alpha").await.unwrap(),
            Some("v1".to_string())
        );
    }

    #[tokio::test]
    async fn test_list_unions_backends() {
        let temp_dir = TempDir::new().unwrap();
        let keyring = Arc::new(MockKeyring::with_enumeration());
        let store = store_with(&keyring, test_config(&temp_dir));

        keyring.insert("demo", "a", "1");
        keyring.insert("demo", "b", "2");
        keyring.insert("demo", &format!("{PROBE_KEY_PREFIX}leftover"), "x");
        keyring.insert("other-service", "z", "3");
        let files = file_store(&store);
        files.write("b", "2").await.unwrap();
        files.write("c", "3").await.unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_list_without_enumeration() {
        let (_tmp, keyring, store) = mock_store();
        keyring.insert("demo", "a", "1");
        file_store(&store).write("c", "3").await.unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["c"]);
    }

    #[tokio::test]
    async fn test_has() {
        let (_tmp, keyring, store) = mock_store();
        keyring.insert("demo", "in-keyring", "1");
        file_store(&store).write("in-file", "2").await.unwrap();

        assert!(store.has("in-keyring").await.unwrap());
        assert!(store.has("in-file").await.unwrap());
        assert!(!store.has("nowhere").await.unwrap());
    }

    #[tokio::test]
    async fn test_has_propagates_keyring_errors() {
        let (_tmp, keyring, store) = mock_store();
        file_store(&store).write("in-file", "2").await.unwrap();
        keyring.set_behavior(MockBehavior::Locked);

        let err = store.has("in-file").await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Locked));
    }

    #[tokio::test]
    async fn test_loader_runs_once() {
        let temp_dir = TempDir::new().unwrap();
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let loader: KeyringLoader = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<Arc<dyn KeyringAdapter>, _>(KeyringError::Unsupported(
                "no secret service".to_string(),
            ))
        });
        let store = SecureStore::with_keyring_loader(test_config(&temp_dir), loader).unwrap();

        store.set("alpha", "v1").await.unwrap();
        store.get("alpha").await.unwrap();
        store.list().await.unwrap();
        store.delete("alpha").await.unwrap();

        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_key_rejected_before_io() {
        let (_tmp, keyring, store) = mock_store();

        for key in ["../escape", "", "a/b", "bad name"] {
            assert!(matches!(
                store.set(key, "v").await,
                Err(Error::InvalidKeyName { .. })
            ));
            assert!(store.get(key).await.is_err());
            assert!(store.has(key).await.is_err());
            assert!(store.delete(key).await.is_err());
        }

        assert_eq!(keyring.set_calls(), 0);
        assert_eq!(keyring.get_calls(), 0);
        assert!(!store.fallback_dir().exists());
    }

    #[tokio::test]
    async fn test_empty_service_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig::new("").with_fallback_dir(temp_dir.path());
        assert!(matches!(
            SecureStore::with_keyring_loader(config, disabled_loader()),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_sets() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(
            SecureStore::with_keyring_loader(test_config(&temp_dir), disabled_loader()).unwrap(),
        );

        let tasks: Vec<_> = ["k1", "k2", "k3", "k4"]
            .into_iter()
            .map(|key| {
                let store = store.clone();
                tokio::spawn(async move { store.set(key, key).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.list().await.unwrap(), vec!["k1", "k2", "k3", "k4"]);
        assert_eq!(store.get("k3").await.unwrap(), Some("k3".to_string()));
    }

    #[tokio::test]
    async fn test_usable_as_trait_object() {
        let (_tmp, _keyring, store) = mock_store();
        let storage: Arc<dyn SecretStorage> = Arc::new(store);

        storage.set("alpha", "v1").await.unwrap();
        assert!(storage.has("alpha").await.unwrap());
        assert_eq!(storage.list().await.unwrap(), Vec::<String>::new());
        assert!(storage.probe().await);
    }

    #[tokio::test]
    async fn test_legacy_check_runs_once() {
        let (_tmp, _keyring, store) = mock_store();
        let _ = store.check_legacy_credentials();
        assert!(store.check_legacy_credentials().is_empty());
    }

    #[tokio::test]
    async fn test_deny_policy_after_failed_keyring_write() {
        let temp_dir = TempDir::new().unwrap();
        let keyring = Arc::new(MockKeyring::new());
        let config = test_config(&temp_dir).with_fallback_policy(FallbackPolicy::Deny);
        let store = store_with(&keyring, config);
        assert!(store.probe().await);

        keyring.set_behavior(MockBehavior::Locked);
        let err = store.set("alpha", "v1").await.unwrap_err();

        assert_eq!(err.code(), Some(ErrorCode::Unavailable));
        assert!(!store.fallback_dir().join("alpha.enc").exists());
        assert_eq!(keyring.value("demo", "alpha"), None);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn logged_op(logs: &str, op: &str) -> bool {
        logs.contains(&format!("op=\"{op}\"")) || logs.contains(&format!("op={op}"))
    }

    #[tokio::test]
    async fn test_logs_never_contain_values() {
        const SECRET: &str = "sk-sentinel-4b1d9e7a";

        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (_tmp, keyring, store) = mock_store();

        store.set("alpha", SECRET).await.unwrap();
        assert_eq!(store.get("alpha").await.unwrap().as_deref(), Some(SECRET));
        assert!(store.has("alpha").await.unwrap());
        assert!(store.probe().await);

        // Keyring degrades: writes and reads go through the file fallback
        keyring.set_behavior(MockBehavior::Locked);
        store.set("beta", SECRET).await.unwrap();
        assert_eq!(store.get("beta").await.unwrap().as_deref(), Some(SECRET));
        assert!(store.has("beta").await.is_err());
        assert!(store.set("../beta", SECRET).await.is_err());
        store.delete("alpha").await.unwrap();
        store.delete("beta").await.unwrap();

        let output = logs.contents();
        assert!(!output.contains(SECRET), "secret value leaked into logs");
        for op in ["set", "get", "has", "delete", "probe"] {
            assert!(logged_op(&output, op), "no record for {op}");
        }
        assert!(output.contains("cached-available"));
        assert!(output.contains(&crate::telemetry::fingerprint("alpha")));
    }
}
