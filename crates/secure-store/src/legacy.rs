//! Startup check for credential files from older releases
//!
//! Only file existence is checked. The files are never opened, parsed or
//! migrated.

use std::path::{Path, PathBuf};

use directories::BaseDirs;
use tracing::warn;

/// Guidance attached to every legacy-file warning
pub const LEGACY_REMEDIATION: &str = "Legacy credential files are no longer read. \
     Re-save each key with /key save <name> <key>, then delete the old file.";

/// A set of well-known paths to check for legacy credential files
#[derive(Debug, Clone, Default)]
pub struct LegacyCredentialScan {
    paths: Vec<PathBuf>,
}

impl LegacyCredentialScan {
    /// Scan an explicit list of paths
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    /// Scan the well-known locations for a service
    pub fn for_service(service: &str) -> Self {
        Self::new(Self::default_paths(service))
    }

    /// Well-known legacy locations for a service
    pub fn default_paths(service: &str) -> Vec<PathBuf> {
        let Some(dirs) = BaseDirs::new() else {
            return Vec::new();
        };

        let dot_dir = dirs.home_dir().join(format!(".{service}"));
        let config_dir = dirs.config_dir().join(service);

        vec![
            dot_dir.join("credentials"),
            dot_dir.join("credentials.json"),
            config_dir.join("credentials.json"),
            config_dir.join("keys.json"),
        ]
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Warn about every path that exists; returns the hits
    pub fn scan(&self) -> Vec<PathBuf> {
        self.paths
            .iter()
            .filter(|path| is_present(path))
            .inspect(|path| {
                warn!(
                    path = %path.display(),
                    remediation = LEGACY_REMEDIATION,
                    "Found legacy credential file"
                );
            })
            .cloned()
            .collect()
    }
}

fn is_present(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}
