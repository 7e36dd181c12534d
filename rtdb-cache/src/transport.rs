//! Request transport
//!
//! The cache never talks to the network directly; every remote call goes
//! through a [`Transport`]. [`HttpTransport`] is the default implementation
//! on top of `reqwest`.

use crate::error::{Result, StoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// HTTP method used against the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Get,
    Put,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Put => write!(f, "PUT"),
        }
    }
}

/// A fully-built request, ready to hand to a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl StoreRequest {
    /// Request path with the leading `/` and `.json` suffix removed, still
    /// percent-encoded
    pub fn store_path(&self) -> &str {
        let path = self.url.path().trim_start_matches('/');
        path.strip_suffix(".json").unwrap_or(path)
    }

    /// Value of a query parameter, if present
    pub fn query_param(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

/// Raw status/body pair returned by the remote store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreResponse {
    pub status: u16,
    pub body: String,
}

impl StoreResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// The store signals success with exactly 200
    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    /// Writes also accept 204, which `print=silent` produces
    pub fn is_write_success(&self) -> bool {
        self.status == 200 || self.status == 204
    }

    /// Parse the body as JSON
    pub fn json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Network-facing primitive every remote call is routed through
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the request and return the raw status/body pair
    ///
    /// Non-2xx statuses are not errors at this layer; only failures to
    /// obtain a response at all are.
    async fn send(&self, request: &StoreRequest) -> Result<StoreResponse>;
}

/// `reqwest`-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with the given per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.store_path()))]
    async fn send(&self, request: &StoreRequest) -> Result<StoreResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(request.url.clone()),
            Method::Put => self.client.put(request.url.clone()),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        debug!(status, bytes = body.len(), "Received response");
        Ok(StoreResponse { status, body })
    }
}
