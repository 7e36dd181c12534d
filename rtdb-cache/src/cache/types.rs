//! Core type definitions for the cache system

use crate::cache::node::CacheNode;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Child path segment -> node. Order is irrelevant.
pub type SubtreeMap = HashMap<String, CacheNode>;

/// A leaf value in the remote tree
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl Scalar {
    /// Convert a JSON value; `None` for objects and arrays
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Scalar::Null),
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::Number(n) => Some(Scalar::Number(n.clone())),
            Value::String(s) => Some(Scalar::String(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Number(n) => Value::Number(n.clone()),
            Scalar::String(s) => Value::String(s.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => n.as_f64(),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Number(n) => write!(f, "{}", n),
            Scalar::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::String(s)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Number(n.into())
    }
}

/// The value held by a cache node
///
/// `Subtree` iff the remote value was a JSON object (or array) at the last
/// refresh; anything else is a `Scalar`.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Scalar(Scalar),
    Subtree(SubtreeMap),
}

impl CacheValue {
    pub fn null() -> Self {
        CacheValue::Scalar(Scalar::Null)
    }

    pub fn is_subtree(&self) -> bool {
        matches!(self, CacheValue::Subtree(_))
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            CacheValue::Scalar(s) => Some(s),
            CacheValue::Subtree(_) => None,
        }
    }

    pub fn as_subtree(&self) -> Option<&SubtreeMap> {
        match self {
            CacheValue::Subtree(map) => Some(map),
            CacheValue::Scalar(_) => None,
        }
    }

    /// Direct child node of a subtree value
    pub fn child(&self, key: &str) -> Option<&CacheNode> {
        self.as_subtree().and_then(|map| map.get(key))
    }

    /// Sorted child keys; empty for scalars
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .as_subtree()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

impl From<Scalar> for CacheValue {
    fn from(s: Scalar) -> Self {
        CacheValue::Scalar(s)
    }
}

/// Statistics for cache and remote traffic monitoring
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from an existing node without a refresh
    pub hits: u64,

    /// Lookups that needed the remote store
    pub misses: u64,

    /// GET requests issued for controller-level misses
    pub fetches: u64,

    /// Successful node refreshes
    pub refreshes: u64,

    /// Refreshes that left the cached value untouched
    pub failed_refreshes: u64,

    /// Successful write-throughs
    pub writes: u64,

    /// Writes rejected by the remote store
    pub failed_writes: u64,

    /// Number of root cache entries
    pub entries: usize,
}

impl CacheStats {
    /// Calculate cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, entries: {}, refreshes: {}, writes: {} }}",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.entries,
            self.refreshes,
            self.writes
        )
    }
}

/// Lock-free counters shared by a controller and its nodes
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    refreshes: AtomicU64,
    failed_refreshes: AtomicU64,
    writes: AtomicU64,
    failed_writes: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fetch(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn refresh(&self, succeeded: bool) {
        if succeeded {
            self.refreshes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_refreshes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn write(&self, succeeded: bool) {
        if succeeded {
            self.writes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_writes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self, entries: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            failed_refreshes: self.failed_refreshes.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            failed_writes: self.failed_writes.load(Ordering::Relaxed),
            entries,
        }
    }
}
