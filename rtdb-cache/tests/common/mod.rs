//! Shared test support: a scripted in-memory transport

#![allow(dead_code)]

use async_trait::async_trait;
use rtdb_cache::{
    Method, Result, StoreConfig, StoreController, StoreError, StoreRequest, StoreResponse,
    Transport,
};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Transport that replays scripted responses per (method, path)
///
/// Each scripted queue is consumed front to back; its last response then
/// repeats. Unscripted GETs answer `200 null`; unscripted PUTs echo their
/// body with `200`. Every request is recorded.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<HashMap<(Method, String), VecDeque<Outcome>>>,
    requests: Mutex<Vec<StoreRequest>>,
    gate: Option<Semaphore>,
    holds: Mutex<HashMap<(Method, String), Arc<Semaphore>>>,
    delay: Option<Duration>,
}

#[derive(Clone)]
enum Outcome {
    Respond(u16, String),
    Fail(String),
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root validation succeeds
    pub fn healthy() -> Self {
        let transport = Self::new();
        transport.respond(Method::Get, "", 200, "true");
        transport
    }

    /// Every request waits until [`release`](Self::release) is called
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    /// Every request sleeps before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1 << 20);
        }
    }

    /// Requests for (method, path) wait until [`unhold`](Self::unhold)
    pub fn hold(&self, method: Method, path: &str) {
        self.holds
            .lock()
            .unwrap()
            .insert((method, path.to_string()), Arc::new(Semaphore::new(0)));
    }

    pub fn unhold(&self, method: Method, path: &str) {
        if let Some(hold) = self.holds.lock().unwrap().remove(&(method, path.to_string())) {
            hold.add_permits(1 << 20);
        }
    }

    /// Wait until `count` requests for (method, path) have been sent
    pub async fn wait_for_requests(&self, method: Method, path: &str, count: usize) {
        while self.count(method, path) < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub fn respond(&self, method: Method, path: &str, status: u16, body: &str) {
        self.push(method, path, Outcome::Respond(status, body.to_string()));
    }

    pub fn respond_json(&self, method: Method, path: &str, status: u16, body: Value) {
        self.respond(method, path, status, &body.to_string());
    }

    /// Replace any scripted GETs for `path` with a single JSON body
    pub fn serve(&self, path: &str, body: Value) {
        let mut responses = self.responses.lock().unwrap();
        responses.insert(
            (Method::Get, path.to_string()),
            VecDeque::from([Outcome::Respond(200, body.to_string())]),
        );
    }

    /// Fail without a response, as a network error would
    pub fn fail(&self, method: Method, path: &str, reason: &str) {
        self.push(method, path, Outcome::Fail(reason.to_string()));
    }

    fn push(&self, method: Method, path: &str, outcome: Outcome) {
        self.responses
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(outcome);
    }

    pub fn requests(&self) -> Vec<StoreRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.store_path() == path)
            .count()
    }

    pub fn gets(&self, path: &str) -> usize {
        self.count(Method::Get, path)
    }

    pub fn puts(&self, path: &str) -> usize {
        self.count(Method::Put, path)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &StoreRequest) -> Result<StoreResponse> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(gate) = &self.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| StoreError::Transport(e.to_string()))?;
        }
        let key = (request.method, request.store_path().to_string());
        let hold = self.holds.lock().unwrap().get(&key).cloned();
        if let Some(hold) = hold {
            let _permit = hold
                .acquire()
                .await
                .map_err(|e| StoreError::Transport(e.to_string()))?;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = {
            let mut responses = self.responses.lock().unwrap();
            match responses.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match outcome {
            Some(Outcome::Respond(status, body)) => Ok(StoreResponse::new(status, body)),
            Some(Outcome::Fail(reason)) => Err(StoreError::Transport(reason)),
            None => match request.method {
                Method::Get => Ok(StoreResponse::new(200, "null")),
                Method::Put => Ok(StoreResponse::new(
                    200,
                    request.body.clone().unwrap_or_default(),
                )),
            },
        }
    }
}

pub fn config(ttl: Duration) -> StoreConfig {
    StoreConfig::builder("proj-default-rtdb", "abc").ttl(ttl).build()
}

/// A controller over `transport`, not yet awaited
pub fn controller(transport: &Arc<ScriptedTransport>, ttl: Duration) -> StoreController {
    StoreController::with_transport(config(ttl), transport.clone()).unwrap()
}

/// A validated controller over `transport`
pub async fn ready_controller(transport: &Arc<ScriptedTransport>, ttl: Duration) -> StoreController {
    let store = controller(transport, ttl);
    store.ready().await.unwrap();
    store
}
