use std::time::Duration;

/// Process-wide caching policy. Loaded once at startup and shared read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachePolicy {
    /// TTL applied when the response carries no freshness information.
    /// Zero disables heuristic caching.
    pub default_ttl: Duration,
    /// Reserved: strict handling of `no-cache` responses.
    pub respect_no_cache: bool,
    /// Reserved: `no-store` is currently always binding.
    pub respect_no_store: bool,
    /// Reserved for conditional revalidation.
    pub revalidate_window: Duration,
}

impl CachePolicy {
    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            ..Default::default()
        }
    }
}
