//! Request-serving pipeline: cache lookup, origin fetch, cacheability
//! decision and conditional store.
//!
//! One pass per request with no retries. Cache read failures and origin
//! failures end the request with an error; cache write and metrics failures
//! are logged and swallowed.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::{MetricsError, ProxyError};
use crate::metrics::MetricsSink;
use crate::model::{CacheEntry, CachePolicy, RequestModel, ResponseModel};
use crate::normalize::cache_key;
use crate::origin::{OriginClient, RequestContext};
use crate::policy::PolicyEvaluator;
use crate::store::ResponseStore;

/// Whether a response came from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServedResponse {
    pub response: ResponseModel,
    pub cache_status: CacheStatus,
}

/// The collaborators of a [`ProxyPipeline`], injected at construction.
pub struct PipelineDeps {
    pub store: Arc<dyn ResponseStore>,
    pub origin: Arc<dyn OriginClient>,
    pub evaluator: Arc<dyn PolicyEvaluator>,
    pub metrics: Arc<dyn MetricsSink>,
    pub clock: Arc<dyn Clock>,
}

pub struct ProxyPipeline {
    store: Arc<dyn ResponseStore>,
    origin: Arc<dyn OriginClient>,
    evaluator: Arc<dyn PolicyEvaluator>,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    policy: Arc<CachePolicy>,
}

impl ProxyPipeline {
    pub fn new(deps: PipelineDeps, policy: Arc<CachePolicy>) -> Self {
        Self {
            store: deps.store,
            origin: deps.origin,
            evaluator: deps.evaluator,
            metrics: deps.metrics,
            clock: deps.clock,
            policy,
        }
    }

    /// Serve one request.
    pub async fn serve(
        &self,
        ctx: &RequestContext,
        request: &RequestModel,
    ) -> Result<ServedResponse, ProxyError> {
        let started = Instant::now();
        let key = cache_key(&request.method, request.url.as_ref());

        let lookup_started = Instant::now();
        let cached = self.store.get(&key).map_err(|e| {
            error!(
                method = %request.method,
                url = %key.normalized_url,
                error = %e,
                "Cache lookup failed"
            );
            ProxyError::CacheRead(e)
        })?;
        self.record("cache_latency", self.metrics.record_cache_latency(lookup_started.elapsed()));

        if let Some(entry) = cached {
            self.record("hit", self.metrics.inc_hit());
            info!(
                method = %request.method,
                url = %key.normalized_url,
                latency_ms = started.elapsed().as_millis() as u64,
                "Cache hit"
            );
            return Ok(ServedResponse {
                response: entry.payload().clone(),
                cache_status: CacheStatus::Hit,
            });
        }

        self.record("miss", self.metrics.inc_miss());
        debug!(method = %request.method, url = %key.normalized_url, "Cache miss");

        let outbound = request.for_origin();
        let upstream_started = Instant::now();
        let mut response = match self.origin.fetch(ctx, &outbound).await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    method = %request.method,
                    url = %key.normalized_url,
                    error = %e,
                    "Origin fetch failed"
                );
                return Err(ProxyError::OriginFetch(e));
            }
        };
        self.record(
            "upstream_latency",
            self.metrics.record_upstream_latency(upstream_started.elapsed()),
        );

        let decision = self.evaluator.evaluate(&response, request, &self.policy);
        response.cacheable = decision.cacheable;

        if decision.should_store() {
            let ttl = Duration::from_secs(decision.ttl_seconds.unsigned_abs());
            let entry = CacheEntry::new(key.clone(), response.clone(), ttl, self.clock.now());
            if let Err(e) = self.store.set(entry) {
                error!(
                    url = %key.normalized_url,
                    error = %e,
                    "Failed to store response in cache"
                );
            }
        }

        let total = started.elapsed();
        self.record("total_latency", self.metrics.record_total_latency(total));
        info!(
            method = %request.method,
            url = %key.normalized_url,
            status = response.status.as_u16(),
            cacheable = decision.cacheable,
            ttl_seconds = decision.ttl_seconds,
            latency_ms = total.as_millis() as u64,
            "Served from origin"
        );

        Ok(ServedResponse {
            response,
            cache_status: CacheStatus::Miss,
        })
    }

    fn record(&self, metric: &'static str, result: Result<(), MetricsError>) {
        if let Err(e) = result {
            warn!(metric, error = %e, "Failed to record metric");
        }
    }
}
