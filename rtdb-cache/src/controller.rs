//! Store controller: remote identity, readiness and the root node cache
//!
//! The controller validates the store once, in the background, right after
//! construction. Every operation that talks to the store waits for that
//! validation; if it failed, they all return the validation error.

use crate::cache::node::CacheNode;
use crate::cache::readiness::{Readiness, ReadyState};
use crate::cache::tree::{normalize_path, validate_key, value_at};
use crate::cache::types::{CacheStats, CacheValue, StatsRecorder};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::options::QueryOptions;
use crate::transport::{HttpTransport, Method, StoreRequest, StoreResponse, Transport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

/// Health status of the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Store is reachable and responsive
    Healthy,
    /// Store is reachable but slow (above the degraded threshold)
    Degraded,
    /// Store is unreachable or rejecting requests
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy or degraded (operational)
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }
}

/// Result of an on-demand health probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub response_time_ms: u64,
    /// HTTP status, when a response was received
    pub http_status: Option<u16>,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

/// Responses slower than this are reported as degraded
const DEGRADED_THRESHOLD_MS: u64 = 1000;

impl HealthCheckResult {
    fn from_response(elapsed: Duration, response: &StoreResponse) -> Self {
        let response_time_ms = elapsed.as_millis() as u64;
        let (status, error) = if !response.is_success() {
            (
                HealthStatus::Unhealthy,
                Some(StoreError::from_status(response.status, response.body.clone()).to_string()),
            )
        } else if response_time_ms > DEGRADED_THRESHOLD_MS {
            (HealthStatus::Degraded, None)
        } else {
            (HealthStatus::Healthy, None)
        };

        Self {
            status,
            response_time_ms,
            http_status: Some(response.status),
            timestamp: Utc::now(),
            error,
        }
    }

    fn unreachable(elapsed: Duration, error: &StoreError) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            response_time_ms: elapsed.as_millis() as u64,
            http_status: None,
            timestamp: Utc::now(),
            error: Some(error.to_string()),
        }
    }
}

/// State shared between a controller and the nodes it created
pub(crate) struct ControllerShared {
    config: StoreConfig,
    transport: Arc<dyn Transport>,
    ready: Readiness,
    root_cache: RwLock<HashMap<String, CacheNode>>,
    pub(crate) stats: StatsRecorder,
}

impl ControllerShared {
    /// TTL for a node installed now
    pub(crate) fn node_ttl(&self) -> Duration {
        self.config.ttl_with_jitter()
    }

    pub(crate) async fn wait_ready(&self) -> Result<()> {
        self.ready.wait().await
    }

    /// Build the full request for `path`: base URL, `.json` suffix, merged
    /// options, `auth` and the JSON content type.
    pub(crate) fn build_request(
        &self,
        path: &str,
        method: Method,
        options: &QueryOptions,
        body: Option<String>,
    ) -> Result<StoreRequest> {
        let path = normalize_path(path);
        let mut url = Url::parse(&self.config.base_url())
            .map_err(|e| StoreError::Config(format!("invalid base URL: {}", e)))?;

        // Keys may contain `?`, `%` or spaces; each segment is escaped on its own
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                StoreError::Config(format!("base URL cannot carry a path: {}", self.config.base_url()))
            })?;
            segments.pop_if_empty();

            let mut keys: Vec<&str> = path.split('/').filter(|key| !key.is_empty()).collect();
            let last = format!("{}.json", keys.pop().unwrap_or_default());
            segments.extend(keys);
            segments.push(&last);
        }

        {
            let mut query = url.query_pairs_mut();
            for (key, value) in self.config.default_options.merge(options).to_query_pairs() {
                query.append_pair(key, &value);
            }
            if !self.config.secret.is_empty() {
                query.append_pair("auth", &self.config.secret);
            }
        }

        Ok(StoreRequest {
            method,
            url,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body,
        })
    }

    /// Sole network-facing primitive; does not wait for readiness
    pub(crate) async fn send_request(
        &self,
        path: &str,
        method: Method,
        options: &QueryOptions,
        body: Option<String>,
    ) -> Result<StoreResponse> {
        let request = self.build_request(path, method, options, body)?;
        debug!(method = %method, path = %request.store_path(), "Sending request");
        self.transport.send(&request).await
    }

    /// One-time shallow probe of the root; settles the readiness gate
    async fn validate(&self) {
        debug!(name = %self.config.name, "Validating store");

        let outcome = match self
            .send_request("", Method::Get, &QueryOptions::shallow(), None)
            .await
        {
            Ok(response) if response.is_success() => Ok(()),
            Ok(response) => Err(StoreError::from_status(response.status, response.body)),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                info!(name = %self.config.name, "Store validated");
                self.ready.resolve();
            }
            Err(e) => {
                error!(name = %self.config.name, error = %e, "Store validation failed");
                self.ready.reject(e);
            }
        }
    }
}

/// Client-side cache over one remote store
///
/// Cloning is cheap; clones share the same cache and readiness gate.
#[derive(Clone)]
pub struct StoreController {
    shared: Arc<ControllerShared>,
}

impl StoreController {
    /// Create a controller with the default TTL (5 minutes)
    ///
    /// Validation starts in the background; await [`ready`](Self::ready)
    /// before relying on the instance. Must be called from within a tokio
    /// runtime.
    ///
    /// # Example
    /// ```no_run
    /// use rtdb_cache::StoreController;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let store = StoreController::new("proj-default-rtdb", "secret")?;
    ///     store.ready().await?;
    ///
    ///     if let Some(users) = store.get("users").await? {
    ///         println!("users: {:?}", users.keys());
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub fn new(name: &str, secret: &str) -> Result<Self> {
        Self::with_config(StoreConfig::new(name, secret))
    }

    /// Create a controller with a custom TTL
    pub fn with_ttl(name: &str, secret: &str, ttl: Duration) -> Result<Self> {
        Self::with_config(StoreConfig::builder(name, secret).ttl(ttl).build())
    }

    /// Create a controller over the default HTTP transport
    pub fn with_config(config: StoreConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.request_timeout)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a controller over any transport
    pub fn with_transport(config: StoreConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        info!(
            "Creating store controller for '{}' (ttl: {:?})",
            config.name, config.ttl
        );

        let shared = Arc::new(ControllerShared {
            config,
            transport,
            ready: Readiness::pending(),
            root_cache: RwLock::new(HashMap::new()),
            stats: StatsRecorder::default(),
        });

        let validating = shared.clone();
        tokio::spawn(async move { validating.validate().await });

        Ok(Self { shared })
    }

    pub(crate) fn shared(&self) -> &ControllerShared {
        &self.shared
    }

    pub(crate) fn downgrade(&self) -> Weak<ControllerShared> {
        Arc::downgrade(&self.shared)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    /// Wait for validation; returns its error if it failed
    pub async fn ready(&self) -> Result<()> {
        self.shared.ready.wait().await
    }

    pub fn is_ready(&self) -> bool {
        self.shared.ready.is_ready()
    }

    pub fn readiness_state(&self) -> ReadyState {
        self.shared.ready.state()
    }

    /// Value at `path`, served through its cached node
    ///
    /// `Ok(None)` means the path could not be fetched (non-200 or transport
    /// failure); nothing is cached in that case.
    pub async fn get(&self, path: &str) -> Result<Option<CacheValue>> {
        match self.node(path).await? {
            Some(node) => Ok(Some(node.get(false).await?)),
            None => Ok(None),
        }
    }

    /// The memoized node for `path`, fetching and materializing it on a miss
    pub async fn node(&self, path: &str) -> Result<Option<CacheNode>> {
        self.ready().await?;
        let path = normalize_path(path);

        if let Some(node) = self.shared.root_cache.read().await.get(&path) {
            debug!(path = %path, "Root cache hit");
            self.shared.stats.hit();
            return Ok(Some(node.clone()));
        }

        debug!(path = %path, "Root cache miss");
        self.shared.stats.miss();
        self.shared.stats.fetch();

        let response = match self
            .shared
            .send_request(&path, Method::Get, &QueryOptions::new(), None)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(path = %path, error = %e, "Fetch failed");
                return Ok(None);
            }
        };

        if !response.is_success() {
            warn!(path = %path, status = response.status, "Fetch rejected");
            return Ok(None);
        }

        let json = match response.json() {
            Ok(json) => json,
            Err(e) => {
                warn!(path = %path, error = %e, "Unparseable fetch body");
                return Ok(None);
            }
        };

        let node = CacheNode::seeded(path.clone(), self.downgrade(), json, &self.shared);

        // First insert wins; a racing fetch of the same path is discarded
        let mut cache = self.shared.root_cache.write().await;
        let node = cache.entry(path).or_insert(node).clone();
        Ok(Some(node))
    }

    /// Write `value` at `path`, then cache it
    ///
    /// The store is written first. Once it accepted the value, every root
    /// entry that overlaps `path` is brought up to date: a cached ancestor
    /// gets the value installed at the matching descendant (grafting the
    /// branch if it was not there), and cached entries below `path` take
    /// their part of the new value. If nothing overlaps, a fresh node for
    /// `path` is cached.
    pub async fn set(&self, path: &str, value: serde_json::Value) -> Result<()> {
        self.ready().await?;
        let path = normalize_path(path);
        for key in path.split('/').filter(|key| !key.is_empty()) {
            validate_key(key)?;
        }

        let body = serde_json::to_string(&value)?;
        let response = match self
            .shared
            .send_request(&path, Method::Put, &QueryOptions::new(), Some(body))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.shared.stats.write(false);
                return Err(StoreError::Write {
                    path,
                    status: 0,
                    body: e.to_string(),
                });
            }
        };

        if !response.is_write_success() {
            self.shared.stats.write(false);
            warn!(path = %path, status = response.status, "Remote write rejected");
            return Err(StoreError::Write {
                path,
                status: response.status,
                body: response.body,
            });
        }

        self.shared.stats.write(true);
        self.apply_write(path, value).await;
        Ok(())
    }

    /// Bring the root cache in line with a write the store accepted
    async fn apply_write(&self, path: String, value: serde_json::Value) {
        let entries: Vec<(String, CacheNode)> = self
            .shared
            .root_cache
            .read()
            .await
            .iter()
            .map(|(key, node)| (key.clone(), node.clone()))
            .collect();

        let mut covered = false;
        for (key, node) in entries {
            if let Some(below) = relative_keys(&key, &path) {
                covered = true;
                self.write_below(node, &below, value.clone()).await;
            } else if let Some(below) = relative_keys(&path, &key) {
                let part = value_at(&value, &below)
                    .cloned()
                    .unwrap_or(serde_json::Value::Null);
                debug!(path = %key, "Updating cached entry below written path");
                node.apply_write(part, &self.shared).await;
            }
        }

        if !covered {
            let node = CacheNode::seeded(path.clone(), self.downgrade(), value, &self.shared);
            self.shared.root_cache.write().await.entry(path).or_insert(node);
        }
    }

    /// Install `value` at `keys` below a cached root node
    async fn write_below(&self, mut node: CacheNode, keys: &[String], value: serde_json::Value) {
        let mut depth = 0;
        while depth < keys.len() {
            let next = node.child(&keys[depth]).await;
            match next {
                Ok(Some(child)) => {
                    node = child;
                    depth += 1;
                }
                _ => break,
            }
        }

        if depth == keys.len() {
            node.apply_write(value, &self.shared).await;
        } else {
            node.graft(&keys[depth..], value, &self.shared).await;
        }
    }

    /// Drop the root entry for `path`; the next `get` fetches afresh
    pub async fn invalidate(&self, path: &str) -> bool {
        let path = normalize_path(path);
        let removed = self.shared.root_cache.write().await.remove(&path).is_some();
        if removed {
            debug!(path = %path, "Invalidated root cache entry");
        }
        removed
    }

    /// Paths currently held in the root cache, sorted
    pub async fn cached_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.shared.root_cache.read().await.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.shared.root_cache.read().await.len();
        self.shared.stats.snapshot(entries)
    }

    /// Raw request against the store, after readiness
    pub async fn send_request(
        &self,
        path: &str,
        method: Method,
        options: &QueryOptions,
        body: Option<String>,
    ) -> Result<StoreResponse> {
        self.ready().await?;
        self.shared.send_request(path, method, options, body).await
    }

    /// Probe the store now, without touching readiness or the cache
    pub async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();

        match self
            .shared
            .send_request("", Method::Get, &QueryOptions::shallow(), None)
            .await
        {
            Ok(response) => {
                let result = HealthCheckResult::from_response(start.elapsed(), &response);
                debug!(status = ?result.status, ms = result.response_time_ms, "Health check complete");
                result
            }
            Err(e) => {
                warn!(error = %e, "Health check failed");
                HealthCheckResult::unreachable(start.elapsed(), &e)
            }
        }
    }
}

/// Keys leading from `ancestor` down to `path`, if `ancestor` is `path` or
/// one of its ancestors
fn relative_keys(ancestor: &str, path: &str) -> Option<Vec<String>> {
    let rest = if ancestor.is_empty() {
        path
    } else if path == ancestor {
        ""
    } else {
        path.strip_prefix(ancestor)?.strip_prefix('/')?
    };

    Some(
        rest.split('/')
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

impl std::fmt::Debug for StoreController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreController")
            .field("name", &self.shared.config.name)
            .field("ttl", &self.shared.config.ttl)
            .field("ready", &self.shared.ready.state())
            .finish_non_exhaustive()
    }
}
