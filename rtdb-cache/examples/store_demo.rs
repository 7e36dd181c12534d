//! Store Cache Demo
//!
//! Validates a store, reads a path through the cache twice, writes a value
//! through, and prints the cache statistics.
//!
//! Usage:
//!   cargo run --example store_demo -- users
//!
//! Environment variables (a `.env` file is honored):
//!   RTDB_NAME         - Database name, e.g. proj-default-rtdb (required)
//!   RTDB_SECRET       - Database secret (required)
//!   RTDB_TTL_MS       - Node time-to-live in milliseconds (default: 300000)
//!   RTDB_BASE_URL     - Base URL override (default: https://<name>.firebaseio.com)
//!   RTDB_TIMEOUT_SECS - HTTP timeout in seconds (default: 30)
//!   RUST_LOG          - Log filter (default: info)

use rtdb_cache::{StoreConfig, StoreController};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "users".to_string());

    let config = StoreConfig::from_env()?;
    info!("Connecting to {} (ttl: {:?})", config.base_url(), config.ttl);

    let store = StoreController::with_config(config)?;
    store.ready().await?;
    info!("✓ Store validated");

    let health = store.health_check().await;
    info!(
        "Health: {:?} in {}ms",
        health.status, health.response_time_ms
    );

    info!("\n--- Cold read of '{}' ---", path);
    match store.get(&path).await? {
        Some(value) => info!("Keys: {:?}", value.keys()),
        None => warn!("'{}' could not be fetched", path),
    }

    info!("\n--- Warm read of '{}' ---", path);
    if let Some(node) = store.node(&path).await? {
        info!("{}", serde_json::to_string_pretty(&node.to_json().await?)?);
        info!("Expires at {}", node.expires_at().await);
    }

    info!("\n--- Write-through ---");
    let demo_path = format!("{}/rtdb-cache-demo", path);
    match store
        .set(&demo_path, json!({"touched_at": chrono::Utc::now().to_rfc3339()}))
        .await
    {
        Ok(()) => info!("✓ Wrote {}", demo_path),
        Err(e) => warn!("✗ Write failed: {}", e),
    }

    info!("\n--- Statistics ---");
    info!("{}", store.stats().await);
    info!("Cached paths: {:?}", store.cached_paths().await);

    Ok(())
}
