use hyper::Method;
use std::fmt;
use std::time::{Duration, SystemTime};

use super::ResponseModel;

/// `(method, normalized URL)` pair identifying cache-equivalent requests.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub method: Method,
    pub normalized_url: String,
}

impl CacheKey {
    pub fn new(method: Method, normalized_url: impl Into<String>) -> Self {
        Self {
            method,
            normalized_url: normalized_url.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.method, self.normalized_url)
    }
}

/// A stored response. Immutable: a refetch builds a new entry that replaces
/// this one in the store.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    key: CacheKey,
    payload: ResponseModel,
    expires_at: SystemTime,
    stored_at: SystemTime,
}

impl CacheEntry {
    /// Build an entry stored at `now` that expires `ttl` later.
    pub fn new(key: CacheKey, payload: ResponseModel, ttl: Duration, now: SystemTime) -> Self {
        Self {
            key,
            payload,
            expires_at: now + ttl,
            stored_at: now,
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn payload(&self) -> &ResponseModel {
        &self.payload
    }

    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    pub fn stored_at(&self) -> SystemTime {
        self.stored_at
    }

    /// An entry is expired at or after its expiry instant.
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expires_at <= now
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining_ttl(&self, now: SystemTime) -> Duration {
        self.expires_at.duration_since(now).unwrap_or(Duration::ZERO)
    }

    /// Byte cost used for budget accounting. Never zero so that empty bodies
    /// still count against the budget.
    pub fn cost(&self) -> u64 {
        (self.payload.body.len() as u64).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::{HeaderMap, StatusCode};

    fn entry(body: &'static str, ttl: Duration, now: SystemTime) -> CacheEntry {
        CacheEntry::new(
            CacheKey::new(Method::GET, "/data"),
            ResponseModel::new(StatusCode::OK, HeaderMap::new(), body),
            ttl,
            now,
        )
    }

    #[test]
    fn test_key_display() {
        let key = CacheKey::new(Method::GET, "http://example.com/p?a=1");
        assert_eq!(key.to_string(), "GET:http://example.com/p?a=1");
    }

    #[test]
    fn test_keys_differ_by_method() {
        let get = CacheKey::new(Method::GET, "/a");
        let head = CacheKey::new(Method::HEAD, "/a");
        assert_ne!(get, head);
    }

    #[test]
    fn test_expiry_derived_from_store_time() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let e = entry("x", Duration::from_secs(60), now);
        assert_eq!(e.stored_at(), now);
        assert_eq!(e.expires_at(), now + Duration::from_secs(60));
        assert!(!e.is_expired_at(now + Duration::from_secs(59)));
        assert!(e.is_expired_at(now + Duration::from_secs(60)));
        assert_eq!(
            e.remaining_ttl(now + Duration::from_secs(45)),
            Duration::from_secs(15)
        );
        assert_eq!(e.remaining_ttl(now + Duration::from_secs(90)), Duration::ZERO);
    }

    #[test]
    fn test_cost_is_body_length_with_floor_of_one() {
        let now = SystemTime::now();
        assert_eq!(entry("hello", Duration::from_secs(1), now).cost(), 5);
        assert_eq!(entry("", Duration::from_secs(1), now).cost(), 1);
    }
}
