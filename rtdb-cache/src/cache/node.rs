//! Cache node: one path of the remote tree, kept fresh against a TTL
//!
//! A node holds either a scalar or a map of child nodes. Reads refresh the
//! value from the remote store once it has expired; writes go to the remote
//! store first and only touch the local value once the store accepted them.

use crate::cache::expiry::Expiry;
use crate::cache::readiness::{Readiness, ReadyState};
use crate::cache::tree::{self, join_path, normalize_path, validate_key};
use crate::cache::types::{CacheValue, StatsRecorder, SubtreeMap};
use crate::controller::{ControllerShared, StoreController};
use crate::error::{Result, StoreError};
use crate::options::QueryOptions;
use crate::transport::Method;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Handle to a cached path. Cloning is cheap and shares the same node.
#[derive(Clone)]
pub struct CacheNode {
    inner: Arc<NodeInner>,
}

struct NodeInner {
    path: String,

    /// Non-owning: the controller owns the nodes, not the other way round
    controller: Weak<ControllerShared>,

    state: RwLock<NodeState>,

    /// Serializes refresh and set on this node
    sync: Mutex<()>,

    ready: Readiness,
}

struct NodeState {
    value: CacheValue,
    expiry: Expiry,

    /// Last time a value was installed here, by refresh, write or graft
    installed_at: Option<Instant>,
}

impl CacheNode {
    /// Create a node for `path` owned by `controller`
    ///
    /// With `value`, the node is ready immediately and fresh for one TTL.
    /// Without, a fetch is started in the background (after the controller
    /// is ready) and [`get`](Self::get) waits for it. Must be called from
    /// within a tokio runtime.
    pub fn new(controller: &StoreController, path: &str, value: Option<Value>) -> Self {
        let path = normalize_path(path);
        let weak = controller.downgrade();

        match value {
            Some(json) => Self::seeded(path, weak, json, controller.shared()),
            None => Self::lazy(path, weak),
        }
    }

    /// A ready node installed from an already-fetched value
    pub(crate) fn seeded(
        path: String,
        controller: Weak<ControllerShared>,
        json: Value,
        shared: &ControllerShared,
    ) -> Self {
        let value = tree::materialize(json, &path, &controller, shared);

        Self {
            inner: Arc::new(NodeInner {
                path,
                controller,
                state: RwLock::new(NodeState {
                    value,
                    expiry: Expiry::after(shared.node_ttl()),
                    installed_at: Some(Instant::now()),
                }),
                sync: Mutex::new(()),
                ready: Readiness::ready(),
            }),
        }
    }

    /// A pending node whose first value is fetched in the background
    pub(crate) fn lazy(path: String, controller: Weak<ControllerShared>) -> Self {
        let node = Self {
            inner: Arc::new(NodeInner {
                path,
                controller,
                state: RwLock::new(NodeState {
                    value: CacheValue::null(),
                    expiry: Expiry::expired(),
                    installed_at: None,
                }),
                sync: Mutex::new(()),
                ready: Readiness::pending(),
            }),
        };

        let task_node = node.clone();
        tokio::spawn(async move { task_node.initial_fetch().await });

        node
    }

    async fn initial_fetch(&self) {
        let Some(controller) = self.inner.controller.upgrade() else {
            self.inner.ready.reject(StoreError::ControllerDropped);
            return;
        };

        if let Err(e) = controller.wait_ready().await {
            self.inner.ready.reject(e);
            return;
        }
        drop(controller);

        {
            let _sync = self.inner.sync.lock().await;
            self.refresh_locked().await;
        }
        self.inner.ready.resolve();
    }

    /// The remote path this node represents
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Wait for the node's first value
    pub async fn wait_ready(&self) -> Result<()> {
        self.inner.ready.wait().await
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.is_ready()
    }

    pub fn readiness_state(&self) -> ReadyState {
        self.inner.ready.state()
    }

    pub async fn is_expired(&self) -> bool {
        self.inner.state.read().await.expiry.is_expired()
    }

    pub async fn expires_at(&self) -> DateTime<Utc> {
        self.inner.state.read().await.expiry.expires_at()
    }

    /// Current value, refreshing first if it expired or `force_refresh`
    ///
    /// A failed refresh is logged and the cached value returned as-is.
    pub async fn get(&self, force_refresh: bool) -> Result<CacheValue> {
        self.inner.ready.wait().await?;

        if force_refresh || self.is_expired().await {
            let _sync = self.inner.sync.lock().await;

            // A concurrent caller may have refreshed while we waited for the lock
            if force_refresh || self.is_expired().await {
                debug!(path = %self.inner.path, force_refresh, "Refreshing cache node");
                self.record(StatsRecorder::miss);
                self.refresh_locked().await;
            } else {
                self.record(StatsRecorder::hit);
            }
        } else {
            self.record(StatsRecorder::hit);
        }

        Ok(self.inner.state.read().await.value.clone())
    }

    /// Re-fetch this node's path now
    ///
    /// Returns whether the cached value was replaced. Failures leave the
    /// existing value untouched.
    pub async fn refresh(&self) -> bool {
        if self.inner.ready.wait().await.is_err() {
            return false;
        }

        let _sync = self.inner.sync.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> bool {
        let Some(controller) = self.inner.controller.upgrade() else {
            warn!(path = %self.inner.path, "Store controller dropped, skipping refresh");
            return false;
        };

        let sent_at = Instant::now();
        let succeeded = match controller
            .send_request(&self.inner.path, Method::Get, &QueryOptions::new(), None)
            .await
        {
            Ok(response) if response.is_success() => match response.json() {
                Ok(json) => {
                    self.install(json, &controller, Some(sent_at)).await;
                    true
                }
                Err(e) => {
                    warn!(path = %self.inner.path, error = %e, "Unparseable refresh body, keeping cached value");
                    false
                }
            },
            Ok(response) => {
                warn!(
                    path = %self.inner.path,
                    status = response.status,
                    "Refresh rejected, keeping cached value"
                );
                false
            }
            Err(e) => {
                warn!(path = %self.inner.path, error = %e, "Refresh failed, keeping cached value");
                false
            }
        };

        controller.stats.refresh(succeeded);
        succeeded
    }

    /// Write `value` to the remote store, then cache it
    ///
    /// The local value is only replaced after the store accepted the write;
    /// on failure it is left exactly as it was and a `Write` error returned.
    pub async fn set(&self, value: Value) -> Result<()> {
        self.inner.ready.wait().await?;

        let controller = self
            .inner
            .controller
            .upgrade()
            .ok_or(StoreError::ControllerDropped)?;

        let _sync = self.inner.sync.lock().await;
        let body = serde_json::to_string(&value)?;

        let response = match controller
            .send_request(&self.inner.path, Method::Put, &QueryOptions::new(), Some(body))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                controller.stats.write(false);
                return Err(StoreError::Write {
                    path: self.inner.path.clone(),
                    status: 0,
                    body: e.to_string(),
                });
            }
        };

        if !response.is_write_success() {
            controller.stats.write(false);
            warn!(path = %self.inner.path, status = response.status, "Remote write rejected");
            return Err(StoreError::Write {
                path: self.inner.path.clone(),
                status: response.status,
                body: response.body,
            });
        }

        self.install(value, &controller, None).await;
        controller.stats.write(true);
        debug!(path = %self.inner.path, "Write-through complete");
        Ok(())
    }

    /// Child node of a subtree value; no network access
    pub async fn child(&self, key: &str) -> Result<Option<CacheNode>> {
        validate_key(key)?;
        self.inner.ready.wait().await?;
        Ok(self.inner.state.read().await.value.child(key).cloned())
    }

    /// Snapshot of the cached tree as JSON; no network access
    ///
    /// Array-shaped remote values come back as objects keyed by index.
    pub fn to_json(&self) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            self.inner.ready.wait().await?;
            let value = self.inner.state.read().await.value.clone();

            match value {
                CacheValue::Scalar(scalar) => Ok(scalar.to_json()),
                CacheValue::Subtree(children) => {
                    let mut map = Map::with_capacity(children.len());
                    for (key, child) in children {
                        map.insert(key, child.to_json().await?);
                    }
                    Ok(Value::Object(map))
                }
            }
        })
    }

    /// Install a value the store already accepted for this path
    pub(crate) async fn apply_write(&self, json: Value, shared: &ControllerShared) {
        let _sync = self.inner.sync.lock().await;
        self.install(json, shared, None).await;
    }

    /// Add `json` at `keys` below this node after the store accepted it there
    ///
    /// A scalar node becomes a subtree holding only the new branch. The
    /// node's own TTL is left alone; only the grafted branch is fresh.
    pub(crate) async fn graft(&self, keys: &[String], json: Value, shared: &ControllerShared) {
        let Some((first, rest)) = keys.split_first() else {
            return self.apply_write(json, shared).await;
        };

        // Writing null deletes; there is nothing to add
        if json.is_null() {
            return;
        }

        let nested = rest.iter().rev().fold(json, |inner, key| {
            let mut map = Map::new();
            map.insert(key.clone(), inner);
            Value::Object(map)
        });

        let _sync = self.inner.sync.lock().await;
        let child = CacheNode::seeded(
            join_path(&self.inner.path, first),
            self.inner.controller.clone(),
            nested,
            shared,
        );

        let mut state = self.inner.state.write().await;
        let mut children = match &state.value {
            CacheValue::Subtree(children) => children.clone(),
            CacheValue::Scalar(_) => SubtreeMap::new(),
        };
        children.insert(first.clone(), child);

        state.value = CacheValue::Subtree(children);
        state.installed_at = Some(Instant::now());
        debug!(path = %self.inner.path, key = %first, "Grafted written branch");
    }

    /// Replace the value with `json` and restart the TTL clock
    ///
    /// The caller holds this node's `sync` lock. Existing children are
    /// updated in place, each under its own lock, so handles held elsewhere
    /// keep tracking the same paths. With `since`, `json` is a response to a
    /// request sent at that instant: children changed after it are kept
    /// as they are, and vanished keys are dropped only if they did not.
    fn install<'a>(
        &'a self,
        json: Value,
        shared: &'a ControllerShared,
        since: Option<Instant>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let existing = match &self.inner.state.read().await.value {
                CacheValue::Subtree(children) => Some(children.clone()),
                CacheValue::Scalar(_) => None,
            };

            let value = match (tree::json_entries(json), existing) {
                (Ok(entries), Some(mut existing)) => {
                    let mut map = SubtreeMap::with_capacity(entries.len());
                    for (key, child_json) in entries {
                        let child = match existing.remove(&key) {
                            Some(child) => {
                                child.install_child(child_json, shared, since).await;
                                child
                            }
                            None => CacheNode::seeded(
                                join_path(&self.inner.path, &key),
                                self.inner.controller.clone(),
                                child_json,
                                shared,
                            ),
                        };
                        map.insert(key, child);
                    }

                    for (key, child) in existing {
                        if child.changed_since(since).await {
                            map.insert(key, child);
                        }
                    }
                    CacheValue::Subtree(map)
                }
                (Ok(entries), None) => CacheValue::Subtree(tree::subtree_from_entries(
                    entries,
                    &self.inner.path,
                    &self.inner.controller,
                    shared,
                )),
                (Err(scalar), _) => CacheValue::Scalar(scalar),
            };

            let mut state = self.inner.state.write().await;
            state.value = value;
            state.expiry = Expiry::after(shared.node_ttl());
            state.installed_at = Some(Instant::now());
        })
    }

    async fn install_child(&self, json: Value, shared: &ControllerShared, since: Option<Instant>) {
        let _sync = self.inner.sync.lock().await;

        if self.changed_since(since).await {
            debug!(path = %self.inner.path, "Child changed after the parent's request, keeping it");
            return;
        }
        self.install(json, shared, since).await;
    }

    async fn changed_since(&self, since: Option<Instant>) -> bool {
        let installed_at = self.inner.state.read().await.installed_at;
        matches!((since, installed_at), (Some(since), Some(at)) if at > since)
    }

    fn record(&self, f: impl FnOnce(&StatsRecorder)) {
        if let Some(controller) = self.inner.controller.upgrade() {
            f(&controller.stats);
        }
    }
}

impl PartialEq for CacheNode {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for CacheNode {}

impl fmt::Debug for CacheNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheNode")
            .field("path", &self.inner.path)
            .field("ready", &self.inner.ready.state())
            .finish_non_exhaustive()
    }
}
