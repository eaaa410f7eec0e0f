use chrono::{DateTime, NaiveDateTime, Utc};
use hyper::header::EXPIRES;
use hyper::{Method, StatusCode};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

use super::CacheControl;
use crate::clock::{Clock, SystemClock};
use crate::model::{CachePolicy, RequestModel, ResponseModel};

/// Outcome of a cacheability evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheDecision {
    pub cacheable: bool,
    pub ttl_seconds: i64,
}

impl CacheDecision {
    pub const UNCACHEABLE: Self = Self {
        cacheable: false,
        ttl_seconds: 0,
    };

    pub fn store(ttl_seconds: i64) -> Self {
        Self {
            cacheable: true,
            ttl_seconds,
        }
    }

    /// Cacheable with a TTL long enough to be worth storing.
    pub fn should_store(&self) -> bool {
        self.cacheable && self.ttl_seconds > 0
    }
}

pub trait PolicyEvaluator: Send + Sync {
    fn evaluate(
        &self,
        response: &ResponseModel,
        request: &RequestModel,
        policy: &CachePolicy,
    ) -> CacheDecision;
}

/// Statuses a shared cache may store without explicit freshness, per
/// RFC 7231 §6.1.
pub fn is_cacheable_status(status: StatusCode) -> bool {
    matches!(
        status.as_u16(),
        200 | 203 | 204 | 206 | 300 | 301 | 404 | 405 | 410 | 501
    )
}

/// HTTP cache-control semantics for a shared cache. Rules apply in order and
/// the first match wins.
pub struct HttpPolicyEvaluator {
    clock: Arc<dyn Clock>,
}

impl HttpPolicyEvaluator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl Default for HttpPolicyEvaluator {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl PolicyEvaluator for HttpPolicyEvaluator {
    fn evaluate(
        &self,
        response: &ResponseModel,
        request: &RequestModel,
        policy: &CachePolicy,
    ) -> CacheDecision {
        if request.method != Method::GET {
            return CacheDecision::UNCACHEABLE;
        }

        let cc = CacheControl::from_headers(&response.headers);

        if cc.has("no-store") || cc.has("private") {
            debug!(status = response.status.as_u16(), "Response marked no-store/private");
            return CacheDecision::UNCACHEABLE;
        }

        if !is_cacheable_status(response.status) {
            return CacheDecision::UNCACHEABLE;
        }

        if let Some(secs) = cc.seconds("s-maxage") {
            return CacheDecision::store(secs);
        }

        if let Some(secs) = cc.seconds("max-age") {
            return CacheDecision::store(secs);
        }

        if let Some(expires) = response.header_str(EXPIRES.as_str()) {
            match parse_http_date(expires) {
                Some(at) => {
                    if let Ok(remaining) = at.duration_since(self.clock.now()) {
                        if !remaining.is_zero() {
                            return CacheDecision::store(remaining.as_secs() as i64);
                        }
                    }
                }
                None => debug!(expires, "Ignoring unparseable Expires header"),
            }
        }

        if !policy.default_ttl.is_zero() {
            return CacheDecision::store(policy.default_ttl.as_secs() as i64);
        }

        CacheDecision::UNCACHEABLE
    }
}

/// Parse an HTTP-date in any of the three formats RFC 7231 requires
/// recipients to accept.
pub(crate) fn parse_http_date(raw: &str) -> Option<SystemTime> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc).into());
    }

    // RFC 850: Sunday, 06-Nov-94 08:49:37 GMT
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%A, %d-%b-%y %H:%M:%S GMT") {
        return Some(naive.and_utc().into());
    }

    // asctime: Sun Nov  6 08:49:37 1994
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if let Ok(naive) = NaiveDateTime::parse_from_str(&collapsed, "%a %b %d %H:%M:%S %Y") {
        return Some(naive.and_utc().into());
    }

    None
}
