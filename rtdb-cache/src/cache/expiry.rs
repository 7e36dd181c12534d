//! TTL expiration clock for a cache node

use chrono::{DateTime, Utc};
use std::time::Duration;

/// When a node's value stops being fresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    expires_at: DateTime<Utc>,
}

impl Expiry {
    /// Fresh for `ttl` from now
    pub fn after(ttl: Duration) -> Self {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self { expires_at }
    }

    /// Already stale; used for nodes that have never received a value
    pub fn expired() -> Self {
        Self {
            expires_at: DateTime::<Utc>::MIN_UTC,
        }
    }

    /// Check if the value has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_expiry_after_ttl() {
        let expiry = Expiry::after(Duration::from_millis(100));

        assert!(!expiry.is_expired());
        sleep(Duration::from_millis(150));
        assert!(expiry.is_expired());
    }

    #[test]
    fn test_expired_is_stale() {
        let expiry = Expiry::expired();
        assert!(expiry.is_expired());
        assert!(expiry.expires_at() < Utc::now());
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let expiry = Expiry::after(Duration::from_secs(u64::MAX));
        assert!(!expiry.is_expired());
        assert_eq!(expiry.expires_at(), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_later_expiry_compares_greater() {
        let first = Expiry::after(Duration::from_secs(60));
        sleep(Duration::from_millis(5));
        let second = Expiry::after(Duration::from_secs(60));
        assert!(second.expires_at() > first.expires_at());
    }
}
