//! # rtdb-cache
//!
//! A client-side caching layer for a remote, hierarchical JSON-tree store
//! reached over plain REST calls (Firebase Realtime Database style).
//!
//! ## Features
//!
//! - One-time background validation of the store, gating every operation
//! - Lazy, per-path materialization of the remote tree into cache nodes
//! - Per-node TTL expiry with refresh on read
//! - Write-through `set` that never caches a value the store did not accept
//! - Pluggable [`Transport`] with a `reqwest`-backed default
//!
//! ## Reading
//!
//! ```no_run
//! use rtdb_cache::StoreController;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = StoreController::new("proj-default-rtdb", "secret")?;
//!     store.ready().await?;
//!
//!     if let Some(users) = store.get("users").await? {
//!         for key in users.keys() {
//!             println!("user: {}", key);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Writing
//!
//! ```no_run
//! use rtdb_cache::{StoreConfig, StoreController};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = StoreConfig::builder("proj-default-rtdb", "secret")
//!         .ttl(Duration::from_secs(60))
//!         .build();
//!     let store = StoreController::with_config(config)?;
//!
//!     store.set("users/steve", json!({"name": "Steve"})).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod options;
pub mod transport;

// Re-export main types for convenience
pub use cache::{CacheNode, CacheStats, CacheValue, Expiry, ReadyState, Scalar, SubtreeMap};
pub use config::{StoreConfig, StoreConfigBuilder, DEFAULT_TTL};
pub use controller::{HealthCheckResult, HealthStatus, StoreController};
pub use error::{Result, StoreError};
pub use options::{PrintMode, QueryOptions, TimeUnit, Timeout, WriteSizeLimit};
pub use transport::{HttpTransport, Method, StoreRequest, StoreResponse, Transport};
