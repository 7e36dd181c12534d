//! Configuration for a store controller
//!
//! Identity and credentials for the remote store plus the cache policy
//! applied to every node the controller materializes.

use crate::error::{Result, StoreError};
use crate::options::QueryOptions;
use std::time::Duration;

/// Default node time-to-live: 5 minutes
pub const DEFAULT_TTL: Duration = Duration::from_millis(300_000);

/// Default client-side HTTP timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for a [`StoreController`](crate::StoreController)
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database name, used to derive the default base URL
    pub name: String,

    /// Database secret, sent as the `auth` query parameter
    pub secret: String,

    /// Time-to-live applied to a node's value after each refresh
    pub ttl: Duration,

    /// TTL jitter factor (0.0 - 1.0)
    /// Spreads expiry of nodes materialized in one batch fetch
    pub ttl_jitter: f64,

    /// Base URL override; `https://<name>.firebaseio.com` when unset
    pub base_url: Option<String>,

    /// Client-side timeout for a single HTTP call
    pub request_timeout: Duration,

    /// Options merged into every request
    pub default_options: QueryOptions,
}

impl StoreConfig {
    /// Create a configuration with default cache policy
    pub fn new(name: impl AsRef<str>, secret: impl AsRef<str>) -> Self {
        Self::builder(name, secret).build()
    }

    /// Create a new builder for store configuration
    pub fn builder(name: impl AsRef<str>, secret: impl AsRef<str>) -> StoreConfigBuilder {
        StoreConfigBuilder::new(name, secret)
    }

    /// Load configuration from the environment (and `.env` if present)
    ///
    /// Reads `RTDB_NAME`, `RTDB_SECRET`, `RTDB_TTL_MS`, `RTDB_BASE_URL` and
    /// `RTDB_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let name = std::env::var("RTDB_NAME")
            .map_err(|_| StoreError::Config("RTDB_NAME is not set".to_string()))?;
        let secret = std::env::var("RTDB_SECRET")
            .map_err(|_| StoreError::Config("RTDB_SECRET is not set".to_string()))?;

        let mut builder = Self::builder(name, secret);

        if let Ok(ttl) = std::env::var("RTDB_TTL_MS") {
            let ms: u64 = ttl
                .trim()
                .parse()
                .map_err(|_| StoreError::Config(format!("RTDB_TTL_MS is not a number: {}", ttl)))?;
            builder = builder.ttl(Duration::from_millis(ms));
        }

        if let Ok(base_url) = std::env::var("RTDB_BASE_URL") {
            builder = builder.base_url(base_url);
        }

        if let Ok(timeout) = std::env::var("RTDB_TIMEOUT_SECS") {
            let secs: u64 = timeout.trim().parse().map_err(|_| {
                StoreError::Config(format!("RTDB_TIMEOUT_SECS is not a number: {}", timeout))
            })?;
            builder = builder.request_timeout(Duration::from_secs(secs));
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(StoreError::Config("name must not be empty".to_string()));
        }

        if self.ttl.is_zero() {
            return Err(StoreError::Config("ttl must be greater than 0".to_string()));
        }

        if !(0.0..=1.0).contains(&self.ttl_jitter) {
            return Err(StoreError::Config(
                "ttl_jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(StoreError::Config(
                "request_timeout must be greater than 0".to_string(),
            ));
        }

        url::Url::parse(&self.base_url())
            .map_err(|e| StoreError::Config(format!("invalid base URL: {}", e)))?;

        Ok(())
    }

    /// Base URL all request paths are joined onto
    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.firebaseio.com", self.name),
        }
    }

    /// Calculate actual TTL with jitter applied
    pub fn ttl_with_jitter(&self) -> Duration {
        if self.ttl_jitter == 0.0 {
            return self.ttl;
        }

        let base_ms = self.ttl.as_secs_f64() * 1000.0;
        let jitter_range = base_ms * self.ttl_jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        let final_ms = (base_ms + jitter).max(1.0);

        Duration::from_secs_f64(final_ms / 1000.0)
    }
}

/// Builder for store configuration
#[derive(Debug)]
pub struct StoreConfigBuilder {
    name: String,
    secret: String,
    ttl: Option<Duration>,
    ttl_jitter: Option<f64>,
    base_url: Option<String>,
    request_timeout: Option<Duration>,
    default_options: Option<QueryOptions>,
}

impl StoreConfigBuilder {
    /// Name and secret are trimmed of surrounding whitespace
    pub fn new(name: impl AsRef<str>, secret: impl AsRef<str>) -> Self {
        Self {
            name: name.as_ref().trim().to_string(),
            secret: secret.as_ref().trim().to_string(),
            ttl: None,
            ttl_jitter: None,
            base_url: None,
            request_timeout: None,
            default_options: None,
        }
    }

    /// Set the node time-to-live
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set the node time-to-live in milliseconds
    pub fn ttl_ms(self, ms: u64) -> Self {
        self.ttl(Duration::from_millis(ms))
    }

    /// Set TTL jitter factor (0.0 - 1.0)
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    /// Override the base URL (emulators, proxies, tests)
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn default_options(mut self, options: QueryOptions) -> Self {
        self.default_options = Some(options);
        self
    }

    /// Build the store configuration
    pub fn build(self) -> StoreConfig {
        StoreConfig {
            name: self.name,
            secret: self.secret,
            ttl: self.ttl.unwrap_or(DEFAULT_TTL),
            ttl_jitter: self.ttl_jitter.unwrap_or(0.0),
            base_url: self.base_url,
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            default_options: self.default_options.unwrap_or_default(),
        }
    }
}
