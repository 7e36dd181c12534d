//! # Lazy Hierarchical Cache
//!
//! Local, TTL-bounded mirror of a remote JSON tree.
//!
//! ## Features
//!
//! - **Lazy materialization**: a path is fetched on first access and turned
//!   into a tree of [`CacheNode`]s, one per key, all seeded from that single
//!   response
//! - **Per-node TTL**: each node tracks its own expiry and refreshes itself
//!   on the next read once stale
//! - **Write-through**: `set` reaches the remote store before the local value
//!   changes
//! - **Readiness gates**: one-shot barriers that hold reads until a node (or
//!   its controller) has a value
//!
//! ## Example
//!
//! ```no_run
//! use rtdb_cache::{CacheNode, StoreController};
//! use serde_json::json;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = StoreController::new("proj-default-rtdb", "secret")?;
//! store.ready().await?;
//!
//! // Lazily fetched on first read
//! let name = CacheNode::new(&store, "users/steve/name", None);
//! println!("{:?}", name.get(false).await?);
//!
//! // Written to the store, then cached
//! name.set(json!("Steven")).await?;
//! # Ok(())
//! # }
//! ```

pub mod expiry;
pub mod node;
pub mod readiness;
pub mod tree;
pub mod types;

pub use expiry::Expiry;
pub use node::CacheNode;
pub use readiness::{Readiness, ReadyState};
pub use tree::{join_path, normalize_path, validate_key};
pub use types::{CacheStats, CacheValue, Scalar, SubtreeMap};
