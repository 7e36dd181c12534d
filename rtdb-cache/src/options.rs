//! Query options understood by the remote store's REST interface

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output formatting requested from the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrintMode {
    /// Human-readable JSON
    Pretty,
    /// Suppress the response body (writes only)
    Silent,
}

impl fmt::Display for PrintMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrintMode::Pretty => write!(f, "pretty"),
            PrintMode::Silent => write!(f, "silent"),
        }
    }
}

/// Server-side cap on how large a single write may be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteSizeLimit {
    Tiny,
    Small,
    Medium,
    Large,
    Unlimited,
}

impl fmt::Display for WriteSizeLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteSizeLimit::Tiny => write!(f, "tiny"),
            WriteSizeLimit::Small => write!(f, "small"),
            WriteSizeLimit::Medium => write!(f, "medium"),
            WriteSizeLimit::Large => write!(f, "large"),
            WriteSizeLimit::Unlimited => write!(f, "unlimited"),
        }
    }
}

/// Unit for a server-side request timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeUnit {
    Millis,
    Seconds,
    Minutes,
}

impl TimeUnit {
    fn suffix(&self) -> &'static str {
        match self {
            TimeUnit::Millis => "ms",
            TimeUnit::Seconds => "s",
            TimeUnit::Minutes => "min",
        }
    }
}

/// Server-side read timeout, serialized as `<number><unit>` (e.g. `3s`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeout {
    pub value: u64,
    pub unit: TimeUnit,
}

impl Timeout {
    pub fn millis(value: u64) -> Self {
        Self {
            value,
            unit: TimeUnit::Millis,
        }
    }

    pub fn seconds(value: u64) -> Self {
        Self {
            value,
            unit: TimeUnit::Seconds,
        }
    }

    pub fn minutes(value: u64) -> Self {
        Self {
            value,
            unit: TimeUnit::Minutes,
        }
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.suffix())
    }
}

impl FromStr for Timeout {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| StoreError::Config(format!("timeout '{}' is missing a unit", s)))?;
        let (digits, unit) = s.split_at(split);

        let value: u64 = digits
            .parse()
            .map_err(|_| StoreError::Config(format!("timeout '{}' has no numeric value", s)))?;
        if value == 0 {
            return Err(StoreError::Config("timeout must be greater than 0".to_string()));
        }

        let unit = match unit {
            "ms" => TimeUnit::Millis,
            "s" => TimeUnit::Seconds,
            "min" => TimeUnit::Minutes,
            other => {
                return Err(StoreError::Config(format!(
                    "unknown timeout unit '{}' (expected ms, s or min)",
                    other
                )))
            }
        };

        Ok(Self { value, unit })
    }
}

/// Optional query parameters attached to a request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Fetch only the existence of immediate children
    pub shallow: Option<bool>,
    pub print: Option<PrintMode>,
    pub timeout: Option<Timeout>,
    pub write_size_limit: Option<WriteSizeLimit>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for a shallow fetch
    pub fn shallow() -> Self {
        Self::default().with_shallow(true)
    }

    pub fn with_shallow(mut self, shallow: bool) -> Self {
        self.shallow = Some(shallow);
        self
    }

    pub fn with_print(mut self, print: PrintMode) -> Self {
        self.print = Some(print);
        self
    }

    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_write_size_limit(mut self, limit: WriteSizeLimit) -> Self {
        self.write_size_limit = Some(limit);
        self
    }

    /// Overlay `other` on top of `self`; fields set in `other` win.
    pub fn merge(&self, other: &QueryOptions) -> QueryOptions {
        QueryOptions {
            shallow: other.shallow.or(self.shallow),
            print: other.print.or(self.print),
            timeout: other.timeout.or(self.timeout),
            write_size_limit: other.write_size_limit.or(self.write_size_limit),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &QueryOptions::default()
    }

    /// Query parameters in wire order
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(shallow) = self.shallow {
            pairs.push(("shallow", shallow.to_string()));
        }
        if let Some(print) = self.print {
            pairs.push(("print", print.to_string()));
        }
        if let Some(timeout) = self.timeout {
            pairs.push(("timeout", timeout.to_string()));
        }
        if let Some(limit) = self.write_size_limit {
            pairs.push(("writeSizeLimit", limit.to_string()));
        }
        pairs
    }

    /// `key=value` pairs joined with `&`
    pub fn to_query_string(&self) -> String {
        self.to_query_pairs()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }
}
