//! Error types for remote store operations
//!
//! This module defines the error taxonomy for the rtdb-cache library. All
//! payloads are plain strings so a single error can be cloned out to every
//! task waiting on a readiness gate.

use thiserror::Error;

/// Main error type for store and cache operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Remote store or path does not exist (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Credentials rejected by the remote store (HTTP 401)
    #[error("Permission error: {0}")]
    Permission(String),

    /// Initial validation failed with an unexpected status
    #[error("Validation failed with status {status}: {body}")]
    Validation { status: u16, body: String },

    /// A write did not reach the remote store
    #[error("Write to '{path}' failed with status {status}: {body}")]
    Write {
        path: String,
        status: u16,
        body: String,
    },

    /// Network or HTTP client failure before a status was received
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The owning controller was dropped while a node still needed it
    #[error("Store controller has been dropped")]
    ControllerDropped,

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Map a failed validation response onto the error taxonomy.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        match status {
            404 => StoreError::NotFound("database not found".to_string()),
            401 => StoreError::Permission("access denied".to_string()),
            _ => StoreError::Validation {
                status,
                body: body.into(),
            },
        }
    }

    /// Whether this error came from the remote store rejecting validation
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound(_) | StoreError::Permission(_) | StoreError::Validation { .. }
        )
    }
}

impl From<String> for StoreError {
    fn from(s: String) -> Self {
        StoreError::Other(s)
    }
}

impl From<&str> for StoreError {
    fn from(s: &str) -> Self {
        StoreError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Transport(e.to_string())
    }
}
