//! Path helpers and JSON -> node tree materialization

use crate::cache::node::CacheNode;
use crate::cache::types::{CacheValue, Scalar, SubtreeMap};
use crate::controller::ControllerShared;
use crate::error::{Result, StoreError};
use serde_json::Value;
use std::sync::Weak;

/// Characters the remote store rejects inside a key
const FORBIDDEN_KEY_CHARS: [char; 6] = ['.', '$', '#', '[', ']', '/'];

/// Strip leading/trailing slashes and collapse empty segments
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Append a child segment to a (normalized) parent path
pub fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}/{}", parent, key)
    }
}

/// Check that `key` is usable as a single path segment
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(StoreError::Config("key must not be empty".to_string()));
    }

    if let Some(c) = key.chars().find(|c| FORBIDDEN_KEY_CHARS.contains(c) || c.is_control()) {
        return Err(StoreError::Config(format!(
            "key '{}' contains forbidden character {:?}",
            key, c
        )));
    }

    Ok(())
}

/// Child entries of an object or array; arrays are keyed by index
pub(crate) fn json_entries(value: Value) -> std::result::Result<Vec<(String, Value)>, Scalar> {
    match value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        Value::Array(items) => Ok(items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect()),
        other => Err(Scalar::from_json(&other).unwrap_or(Scalar::Null)),
    }
}

/// The part of `json` found at `keys`; array elements are addressed by index
pub(crate) fn value_at<'a>(json: &'a Value, keys: &[String]) -> Option<&'a Value> {
    keys.iter().try_fold(json, |value, key| match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Build a cache value for `json`, creating one pre-seeded node per child
///
/// Children are fresh for one TTL from now, so nothing in the batch needs
/// another round trip until it expires.
pub(crate) fn materialize(
    json: Value,
    path: &str,
    controller: &Weak<ControllerShared>,
    shared: &ControllerShared,
) -> CacheValue {
    match json_entries(json) {
        Ok(entries) => CacheValue::Subtree(subtree_from_entries(entries, path, controller, shared)),
        Err(scalar) => CacheValue::Scalar(scalar),
    }
}

pub(crate) fn subtree_from_entries(
    entries: Vec<(String, Value)>,
    path: &str,
    controller: &Weak<ControllerShared>,
    shared: &ControllerShared,
) -> SubtreeMap {
    entries
        .into_iter()
        .map(|(key, child)| {
            let node = CacheNode::seeded(join_path(path, &key), controller.clone(), child, shared);
            (key, node)
        })
        .collect()
}
