//! Secure store walkthrough
//!
//! Runs against an in-memory keyring and a throwaway fallback directory, so
//! it never touches the real system keyring:
//!
//! ```text
//! RUST_LOG=secure_store=debug cargo run -p secure-store --example demo --features mock
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use secure_store::storage::mock::{MockBehavior, MockKeyring};
use secure_store::{SecureStore, StoreConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let temp_dir = tempfile::tempdir().context("Failed to create fallback directory")?;
    let keyring = Arc::new(MockKeyring::new());

    let mut config = StoreConfig::new("demo").with_fallback_dir(temp_dir.path().join("demo"));
    config.probe_ttl_ms = 100;
    let store = SecureStore::with_keyring_loader(config, keyring.loader())?;

    let legacy = store.check_legacy_credentials();
    info!("Legacy credential files found: {}", legacy.len());

    // Keyring works: writes land there
    info!("Keyring available: {}", store.probe().await);
    store.set("OPENAI_KEY", "sk-demo-keyring").await?;
    info!("Stored OPENAI_KEY in keyring: {}", keyring.value("demo", "OPENAI_KEY").is_some());

    // Keyring goes away: writes fall back to encrypted files
    keyring.set_behavior(MockBehavior::Unavailable);
    tokio::time::sleep(Duration::from_millis(150)).await;
    store.set("ANTHROPIC_KEY", "sk-demo-file").await?;
    info!(
        "Fallback file written: {}",
        store.fallback_dir().join("ANTHROPIC_KEY.enc").exists()
    );
    info!(
        "ANTHROPIC_KEY readable: {}",
        store.get("ANTHROPIC_KEY").await?.is_some()
    );

    // Keyring comes back: new writes return to it
    keyring.set_behavior(MockBehavior::Working);
    tokio::time::sleep(Duration::from_millis(150)).await;
    store.set("ANTHROPIC_KEY", "sk-demo-rotated").await?;
    info!(
        "ANTHROPIC_KEY now in keyring: {}",
        keyring.value("demo", "ANTHROPIC_KEY").is_some()
    );

    info!("Fallback keys: {:?}", store.list().await?);
    info!("Has OPENAI_KEY: {}", store.has("OPENAI_KEY").await?);

    for key in ["OPENAI_KEY", "ANTHROPIC_KEY"] {
        store.delete(key).await?;
    }
    info!("Remaining keys: {:?}", store.list().await?);

    if let Err(e) = store.set("../escape", "nope").await {
        info!("Rejected key name: {e}");
    }

    Ok(())
}
