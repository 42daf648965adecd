//! Storage trait definitions

use async_trait::async_trait;

use crate::error::Result;

/// Secret storage as seen by consumers (key registries, CLI commands, auth
/// resolvers)
#[async_trait]
pub trait SecretStorage: Send + Sync {
    /// Store a value under a key name
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a value; `None` when no backend holds it
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Remove a value from every backend; `true` if anything was removed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// All stored key names, sorted and deduplicated
    async fn list(&self) -> Result<Vec<String>>;

    /// Whether a value exists
    async fn has(&self, key: &str) -> Result<bool>;

    /// Whether the keyring is currently usable
    async fn probe(&self) -> bool;
}
