//! Error types for each collaborator seam of the proxy.

use hyper::StatusCode;
use std::path::PathBuf;

use crate::model::CacheKey;

/// Failures raised by the response cache store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("entry for {key} costs {cost} bytes which exceeds the cache budget of {budget} bytes")]
    Rejected { key: String, cost: u64, budget: u64 },
    #[error("cache invariant violated: {0}")]
    Invariant(String),
    #[error("cache health check failed: {0}")]
    HealthCheck(String),
}

impl StoreError {
    pub(crate) fn rejected(key: &CacheKey, cost: u64, budget: u64) -> Self {
        StoreError::Rejected {
            key: key.to_string(),
            cost,
            budget,
        }
    }
}

/// Failures raised while talking to the origin.
#[derive(Debug, thiserror::Error)]
pub enum OriginError {
    #[error("invalid origin request: {0}")]
    InvalidRequest(String),
    #[error("origin transport error: {0}")]
    Transport(String),
    #[error("failed to read origin response body: {0}")]
    Body(String),
    #[error("origin request cancelled")]
    Cancelled,
    #[error("origin request deadline exceeded")]
    DeadlineExceeded,
    #[error("origin reported unhealthy status {0}")]
    Unhealthy(StatusCode),
}

impl OriginError {
    /// True for failures caused by the caller's context rather than the origin.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, OriginError::Cancelled | OriginError::DeadlineExceeded)
    }
}

/// Failures raised by a metrics sink. Never fatal.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to record metric: {0}")]
    Record(String),
    #[error("failed to encode metrics: {0}")]
    Encode(String),
}

impl From<prometheus::Error> for MetricsError {
    fn from(err: prometheus::Error) -> Self {
        MetricsError::Record(err.to_string())
    }
}

/// Invalid or unreadable configuration. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid value {value:?} for {field}: {reason}")]
    Invalid {
        field: String,
        value: String,
        reason: String,
    },
    #[error("origin.origin_url is required")]
    MissingOrigin,
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, value: &str, reason: &str) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A failed liveness or readiness probe.
#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("store unhealthy: {0}")]
    Store(#[from] StoreError),
    #[error("origin unhealthy: {0}")]
    Origin(#[from] OriginError),
}

/// Request-fatal failures of the proxy pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("cache lookup failed: {0}")]
    CacheRead(#[source] StoreError),
    #[error("origin fetch failed: {0}")]
    OriginFetch(#[source] OriginError),
}

impl ProxyError {
    /// HTTP status surfaced to the client.
    ///
    /// Cache faults are internal errors, origin faults are gateway errors, so
    /// operators can tell the two apart from access logs alone.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::CacheRead(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::OriginFetch(err) if err.is_cancellation() => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::OriginFetch(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Short client-facing description.
    pub fn public_message(&self) -> &'static str {
        match self {
            ProxyError::CacheRead(_) => "internal cache error",
            ProxyError::OriginFetch(err) if err.is_cancellation() => "upstream request timed out",
            ProxyError::OriginFetch(_) => "upstream service error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_read_maps_to_internal_error() {
        let err = ProxyError::CacheRead(StoreError::Invariant("boom".to_string()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "internal cache error");
    }

    #[test]
    fn test_origin_failure_maps_to_bad_gateway() {
        let err = ProxyError::OriginFetch(OriginError::Transport("refused".to_string()));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_origin_cancellation_maps_to_gateway_timeout() {
        assert_eq!(
            ProxyError::OriginFetch(OriginError::Cancelled).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ProxyError::OriginFetch(OriginError::DeadlineExceeded).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_error_display_includes_source() {
        let err = ProxyError::OriginFetch(OriginError::Transport("connection refused".into()));
        assert!(err.to_string().contains("connection refused"));
    }
}
