//! Store configuration
//!
//! Non-sensitive settings for a [`crate::SecureStore`]. Can be built in code
//! or loaded from a JSON file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SecureStoreError;

/// Directory under the user config root holding per-service fallback dirs
pub const DEFAULT_ROOT_DIR: &str = "secure-store";

/// What to do when the keyring cannot take a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// Write to the encrypted file fallback
    #[default]
    Allow,
    /// Fail with `UNAVAILABLE`
    Deny,
}

impl fmt::Display for FallbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackPolicy::Allow => f.write_str("allow"),
            FallbackPolicy::Deny => f.write_str("deny"),
        }
    }
}

impl FromStr for FallbackPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(FallbackPolicy::Allow),
            "deny" => Ok(FallbackPolicy::Deny),
            other => Err(format!(
                "unknown fallback policy {other:?} (expected \"allow\" or \"deny\")"
            )),
        }
    }
}

/// Configuration for a secure store instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// Keyring service name and fallback key-derivation scope
    pub service_name: String,
    /// Directory for `<key>.enc` files (defaults under the user config root)
    pub fallback_dir: Option<PathBuf>,
    /// Behavior when the keyring is unavailable
    pub fallback_policy: FallbackPolicy,
    /// How long a probe result stays valid
    pub probe_ttl_ms: u64,
    /// Consecutive keyring failures that force a re-probe
    pub failure_threshold: u32,
    /// Upper bound on a single keyring call
    pub keyring_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            fallback_dir: None,
            fallback_policy: FallbackPolicy::Allow,
            probe_ttl_ms: 60_000,
            failure_threshold: 3,
            keyring_timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    /// Default configuration for a service
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    pub fn with_fallback_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fallback_dir = Some(dir.into());
        self
    }

    pub fn with_fallback_policy(mut self, policy: FallbackPolicy) -> Self {
        self.fallback_policy = policy;
        self
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, SecureStoreError> {
        let contents = std::fs::read_to_string(path)?;
        let config: StoreConfig = serde_json::from_str(&contents).map_err(|e| {
            SecureStoreError::unavailable(format!("Invalid store config {}: {e}", path.display()))
        })?;
        debug!("Loaded store config from {:?}", path);
        Ok(config)
    }

    pub fn probe_ttl(&self) -> Duration {
        Duration::from_millis(self.probe_ttl_ms)
    }

    pub fn keyring_timeout(&self) -> Duration {
        Duration::from_millis(self.keyring_timeout_ms)
    }

    /// Configured fallback directory, or `<config root>/secure-store/<service>`
    pub fn resolved_fallback_dir(&self) -> Result<PathBuf, SecureStoreError> {
        if let Some(dir) = &self.fallback_dir {
            return Ok(dir.clone());
        }
        BaseDirs::new()
            .map(|dirs| {
                dirs.config_dir()
                    .join(DEFAULT_ROOT_DIR)
                    .join(&self.service_name)
            })
            .ok_or_else(|| {
                SecureStoreError::unavailable("Could not determine the user config directory")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::new("demo");
        assert_eq!(config.fallback_policy, FallbackPolicy::Allow);
        assert_eq!(config.probe_ttl(), Duration::from_secs(60));
        assert_eq!(config.failure_threshold, 3);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("deny".parse::<FallbackPolicy>(), Ok(FallbackPolicy::Deny));
        assert_eq!("allow".parse::<FallbackPolicy>(), Ok(FallbackPolicy::Allow));
        assert!("Deny".parse::<FallbackPolicy>().is_err());
    }

    #[test]
    fn test_load_camel_case_with_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");
        std::fs::write(
            &path,
            r#"{ "serviceName": "demo", "fallbackPolicy": "deny", "probeTtlMs": 1000 }"#,
        )
        .unwrap();

        let config = StoreConfig::load(&path).unwrap();
        assert_eq!(config.service_name, "demo");
        assert_eq!(config.fallback_policy, FallbackPolicy::Deny);
        assert_eq!(config.probe_ttl_ms, 1000);
        assert_eq!(config.keyring_timeout_ms, 5_000);
    }

    #[test]
    fn test_explicit_fallback_dir_wins() {
        let config = StoreConfig::new("demo").with_fallback_dir("/tmp/x");
        assert_eq!(config.resolved_fallback_dir().unwrap(), PathBuf::from("/tmp/x"));
    }

    #[test]
    fn test_default_dir_is_per_service() {
        if let Ok(dir) = StoreConfig::new("demo").resolved_fallback_dir() {
            assert!(dir.ends_with(Path::new(DEFAULT_ROOT_DIR).join("demo")));
        }
    }
}
