//! Integration tests for cache nodes: TTL refresh and write-through

mod common;

use common::{controller, ready_controller, ScriptedTransport};
use futures::future::join_all;
use rtdb_cache::{CacheNode, CacheValue, Method, ReadyState, Scalar, StoreError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn test_scalar_leaf_is_fetched_by_path() {
    let transport = Arc::new(ScriptedTransport::healthy());
    transport.serve("users/steve/name", json!("Steve"));
    let store = ready_controller(&transport, Duration::from_secs(60)).await;

    let node = CacheNode::new(&store, "users/steve/name", None);
    assert_ok!(node.wait_ready().await);

    let value = node.get(false).await.unwrap();
    assert_eq!(value, CacheValue::Scalar(Scalar::from("Steve")));
    assert!(node.child("anything").await.unwrap().is_none());
}

#[tokio::test]
async fn test_stale_value_is_refreshed_once() {
    let transport = Arc::new(ScriptedTransport::healthy());
    let store = ready_controller(&transport, Duration::from_millis(1)).await;

    let node = CacheNode::new(&store, "counter", Some(json!(1)));
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(node.is_expired().await);

    transport.serve("counter", json!(2));
    let value = node.get(false).await.unwrap();

    assert_eq!(value.as_scalar().and_then(Scalar::as_i64), Some(2));
    assert_eq!(transport.gets("counter"), 1);
}

#[tokio::test]
async fn test_fresh_value_is_not_refreshed() {
    let transport = Arc::new(ScriptedTransport::healthy());
    transport.serve("counter", json!(2));
    let store = ready_controller(&transport, Duration::from_secs(60)).await;

    let node = CacheNode::new(&store, "counter", Some(json!(1)));
    for _ in 0..5 {
        assert_eq!(node.to_json().await.unwrap(), json!(1));
        node.get(false).await.unwrap();
    }

    assert!(!node.is_expired().await);
    assert_eq!(transport.gets("counter"), 0);
    assert_eq!(store.stats().await.refreshes, 0);
}

#[tokio::test]
async fn test_forced_refresh_is_idempotent() {
    let transport = Arc::new(ScriptedTransport::healthy());
    transport.serve("flags", json!({"beta": true}));
    let store = ready_controller(&transport, Duration::from_secs(60)).await;

    let node = CacheNode::new(&store, "flags", Some(json!({"beta": false})));

    let first = node.get(true).await.unwrap();
    let second = node.get(true).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(node.to_json().await.unwrap(), json!({"beta": true}));
    assert_eq!(transport.gets("flags"), 2);
}

#[tokio::test]
async fn test_refresh_drops_vanished_keys() {
    let transport = Arc::new(ScriptedTransport::healthy());
    let store = ready_controller(&transport, Duration::from_secs(60)).await;

    let node = CacheNode::new(&store, "users", Some(json!({"ann": 1, "bob": 2})));
    transport.serve("users", json!({"bob": 3}));

    assert!(node.refresh().await);
    assert_eq!(node.get(false).await.unwrap().keys(), vec!["bob"]);
    assert!(node.child("ann").await.unwrap().is_none());
}

#[tokio::test]
async fn test_refresh_to_null_becomes_scalar() {
    let transport = Arc::new(ScriptedTransport::healthy());
    let store = ready_controller(&transport, Duration::from_secs(60)).await;

    let node = CacheNode::new(&store, "session", Some(json!({"token": "t"})));
    transport.serve("session", json!(null));

    assert!(node.refresh().await);
    assert_eq!(node.get(false).await.unwrap(), CacheValue::null());
}

#[tokio::test]
async fn test_write_failure_leaves_value_untouched() {
    let transport = Arc::new(ScriptedTransport::healthy());
    transport.respond(Method::Put, "users/steve", 500, r#"{"error":"boom"}"#);
    let store = ready_controller(&transport, Duration::from_secs(60)).await;

    let node = CacheNode::new(&store, "users/steve", Some(json!({"name": "Steve"})));
    let expires_before = node.expires_at().await;

    let err = assert_err!(node.set(json!({"name": "Steven"})).await);
    assert_eq!(
        err,
        StoreError::Write {
            path: "users/steve".to_string(),
            status: 500,
            body: r#"{"error":"boom"}"#.to_string(),
        }
    );

    assert_eq!(node.to_json().await.unwrap(), json!({"name": "Steve"}));
    assert_eq!(node.expires_at().await, expires_before);
}

#[tokio::test]
async fn test_write_transport_failure_is_a_write_error() {
    let transport = Arc::new(ScriptedTransport::healthy());
    transport.fail(Method::Put, "users/steve", "connection reset");
    let store = ready_controller(&transport, Duration::from_secs(60)).await;

    let node = CacheNode::new(&store, "users/steve", Some(json!({"name": "Steve"})));
    let err = node.set(json!({"name": "Steven"})).await.unwrap_err();

    assert!(matches!(err, StoreError::Write { status: 0, .. }));
    assert_eq!(node.to_json().await.unwrap(), json!({"name": "Steve"}));
}

#[tokio::test]
async fn test_write_success_updates_without_fetch() {
    let transport = Arc::new(ScriptedTransport::healthy());
    let store = ready_controller(&transport, Duration::from_secs(60)).await;

    let node = CacheNode::new(&store, "users/steve", Some(json!({"name": "Steve"})));
    let name = node.child("name").await.unwrap().unwrap();

    assert_ok!(node.set(json!({"name": "Steven", "age": 40})).await);

    assert_eq!(
        node.to_json().await.unwrap(),
        json!({"name": "Steven", "age": 40})
    );
    assert_eq!(name.to_json().await.unwrap(), json!("Steven"));
    assert_eq!(transport.gets("users/steve"), 0);
    assert_eq!(transport.puts("users/steve"), 1);

    let stats = store.stats().await;
    assert_eq!(stats.writes, 1);
    assert_eq!(stats.failed_writes, 0);
}

#[tokio::test]
async fn test_silent_write_is_accepted() {
    let transport = Arc::new(ScriptedTransport::healthy());
    transport.respond(Method::Put, "counter", 204, "");
    let store = ready_controller(&transport, Duration::from_secs(60)).await;

    let node = CacheNode::new(&store, "counter", Some(json!(1)));
    assert_ok!(node.set(json!(2)).await);
    assert_eq!(node.to_json().await.unwrap(), json!(2));
}

#[tokio::test]
async fn test_write_restarts_ttl() {
    let transport = Arc::new(ScriptedTransport::healthy());
    let store = ready_controller(&transport, Duration::from_millis(200)).await;

    let node = CacheNode::new(&store, "counter", Some(json!(1)));
    let expires_before = node.expires_at().await;

    tokio::time::sleep(Duration::from_millis(20)).await;
    node.set(json!(2)).await.unwrap();

    assert!(node.expires_at().await > expires_before);
    assert!(!node.is_expired().await);
}

#[tokio::test]
async fn test_concurrent_stale_reads_share_one_refresh() {
    let transport = Arc::new(ScriptedTransport::healthy().with_delay(Duration::from_millis(20)));
    let store = ready_controller(&transport, Duration::from_millis(300)).await;

    let node = CacheNode::new(&store, "feed", Some(json!({"v": 1})));
    tokio::time::sleep(Duration::from_millis(350)).await;
    transport.serve("feed", json!({"v": 2}));

    let reads = join_all((0..8).map(|_| node.get(false))).await;

    for value in reads {
        assert_eq!(value.unwrap().keys(), vec!["v"]);
    }
    assert_eq!(node.to_json().await.unwrap(), json!({"v": 2}));
    assert_eq!(transport.gets("feed"), 1);
}

#[tokio::test]
async fn test_lazy_node_waits_for_its_first_fetch() {
    let transport = Arc::new(ScriptedTransport::gated());
    transport.serve("users", json!({"steve": {"name": "Steve"}}));
    let store = controller(&transport, Duration::from_secs(60));

    let node = CacheNode::new(&store, "users", None);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(node.readiness_state(), ReadyState::Pending);

    transport.release();

    let value = node.get(false).await.unwrap();
    assert_eq!(value.keys(), vec!["steve"]);
    assert!(node.is_ready());
    assert_eq!(transport.gets("users"), 1);
}

#[tokio::test]
async fn test_lazy_node_fails_with_controller() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond(Method::Get, "", 401, "");
    let store = controller(&transport, Duration::from_secs(60));

    let node = CacheNode::new(&store, "users", None);

    assert!(matches!(node.get(false).await, Err(StoreError::Permission(_))));
    assert!(matches!(node.set(json!(1)).await, Err(StoreError::Permission(_))));
    assert!(matches!(node.readiness_state(), ReadyState::Failed(_)));
    assert_eq!(transport.gets("users"), 0);
}

#[tokio::test]
async fn test_dropped_controller_keeps_cached_value() {
    let transport = Arc::new(ScriptedTransport::healthy());
    let store = ready_controller(&transport, Duration::from_millis(1)).await;

    let node = CacheNode::new(&store, "counter", Some(json!(1)));
    drop(store);
    tokio::time::sleep(Duration::from_millis(5)).await;

    // Stale, but nothing to refresh through
    assert_eq!(node.get(false).await.unwrap().as_scalar().and_then(Scalar::as_i64), Some(1));
    assert!(!node.refresh().await);
    assert_eq!(node.set(json!(2)).await, Err(StoreError::ControllerDropped));
}

#[tokio::test]
async fn test_keys_with_reserved_characters_are_escaped() {
    let transport = Arc::new(ScriptedTransport::healthy());
    let store = ready_controller(&transport, Duration::from_secs(60)).await;

    let faq = CacheNode::new(
        &store,
        "faq",
        Some(json!({"why?": "because", "a%20b": 1, "two words": 2})),
    );

    let why = faq.child("why?").await.unwrap().unwrap();
    assert_ok!(why.set(json!("because I said so")).await);

    let put = transport
        .requests()
        .into_iter()
        .find(|r| r.method == Method::Put)
        .unwrap();
    assert_eq!(put.url.path(), "/faq/why%3F.json");
    assert_eq!(put.query_param("auth"), Some("abc".to_string()));

    let percent = faq.child("a%20b").await.unwrap().unwrap();
    let spaced = faq.child("two words").await.unwrap().unwrap();
    transport.serve("faq/a%2520b", json!(10));
    transport.serve("faq/two%20words", json!(20));

    assert!(percent.refresh().await);
    assert!(spaced.refresh().await);
    assert_eq!(
        faq.to_json().await.unwrap(),
        json!({"why?": "because I said so", "a%20b": 10, "two words": 20})
    );
}

#[tokio::test]
async fn test_parent_refresh_does_not_undo_child_write() {
    let transport = Arc::new(ScriptedTransport::healthy());
    let store = ready_controller(&transport, Duration::from_secs(60)).await;

    let users = CacheNode::new(&store, "users", Some(json!({"steve": {"name": "Steve", "age": 30}})));
    let steve = users.child("steve").await.unwrap().unwrap();
    let name = steve.child("name").await.unwrap().unwrap();

    // The parent's GET goes out before the write and answers after it
    transport.serve("users", json!({"steve": {"name": "Steve", "age": 31}}));
    transport.hold(Method::Get, "users");
    let refresh = {
        let users = users.clone();
        tokio::spawn(async move { users.refresh().await })
    };
    transport.wait_for_requests(Method::Get, "users", 1).await;

    name.set(json!("Steven")).await.unwrap();
    transport.unhold(Method::Get, "users");
    assert!(refresh.await.unwrap());

    assert_eq!(name.to_json().await.unwrap(), json!("Steven"));
    assert_eq!(
        users.to_json().await.unwrap(),
        json!({"steve": {"name": "Steven", "age": 31}})
    );
    assert_eq!(steve.child("name").await.unwrap().unwrap(), name);
}

#[tokio::test]
async fn test_parent_refresh_keeps_branch_written_during_request() {
    let transport = Arc::new(ScriptedTransport::healthy());
    let store = ready_controller(&transport, Duration::from_secs(60)).await;

    let users = CacheNode::new(&store, "users", Some(json!({"ann": 1, "bob": 2})));
    let bob = users.child("bob").await.unwrap().unwrap();

    transport.serve("users", json!({"ann": 1}));
    transport.hold(Method::Get, "users");
    let refresh = {
        let users = users.clone();
        tokio::spawn(async move { users.refresh().await })
    };
    transport.wait_for_requests(Method::Get, "users", 1).await;

    bob.set(json!(3)).await.unwrap();
    transport.unhold(Method::Get, "users");
    assert!(refresh.await.unwrap());

    assert_eq!(users.to_json().await.unwrap(), json!({"ann": 1, "bob": 3}));
}

#[tokio::test]
async fn test_parent_refresh_replaces_children_after_earlier_write() {
    let transport = Arc::new(ScriptedTransport::healthy());
    let store = ready_controller(&transport, Duration::from_secs(60)).await;

    let users = CacheNode::new(&store, "users", Some(json!({"ann": 1})));
    let ann = users.child("ann").await.unwrap().unwrap();
    ann.set(json!(2)).await.unwrap();

    // Written before the refresh was sent; the response is authoritative
    transport.serve("users", json!({"ann": 5}));
    assert!(users.refresh().await);
    assert_eq!(ann.to_json().await.unwrap(), json!(5));
}
