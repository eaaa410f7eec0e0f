//! Prometheus metrics for the caching proxy.
//!
//! The pipeline records through [`MetricsSink`]; every call may fail and the
//! caller logs and moves on.
use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, HistogramVec, IntCounter, IntGauge, Registry,
    TextEncoder,
};
use std::time::Duration;

use crate::error::MetricsError;

/// Sink for cache and latency observations.
pub trait MetricsSink: Send + Sync {
    fn inc_hit(&self) -> Result<(), MetricsError>;
    fn inc_miss(&self) -> Result<(), MetricsError>;
    fn record_eviction(&self) -> Result<(), MetricsError>;
    fn record_upstream_latency(&self, latency: Duration) -> Result<(), MetricsError>;
    fn record_cache_latency(&self, latency: Duration) -> Result<(), MetricsError>;
    fn record_total_latency(&self, latency: Duration) -> Result<(), MetricsError>;
}

const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Metrics backed by a private Prometheus registry.
pub struct PrometheusMetrics {
    registry: Registry,
    hits: IntCounter,
    misses: IntCounter,
    evictions: IntCounter,
    latency: HistogramVec,
    entries: IntGauge,
    cost_bytes: IntGauge,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let hits = register_int_counter_with_registry!(
            "caching_proxy_cache_hits_total",
            "Total number of requests served from the cache",
            registry
        )?;

        let misses = register_int_counter_with_registry!(
            "caching_proxy_cache_misses_total",
            "Total number of requests not found in the cache",
            registry
        )?;

        let evictions = register_int_counter_with_registry!(
            "caching_proxy_cache_evictions_total",
            "Total number of entries evicted from the cache",
            registry
        )?;

        let latency = register_histogram_vec_with_registry!(
            "caching_proxy_latency_seconds",
            "Latency of cache lookups, upstream fetches and whole requests",
            &["type"], // type: cache|upstream|total
            LATENCY_BUCKETS.to_vec(),
            registry
        )?;

        let entries = register_int_gauge_with_registry!(
            "caching_proxy_cache_entries",
            "Number of entries currently held by the cache",
            registry
        )?;

        let cost_bytes = register_int_gauge_with_registry!(
            "caching_proxy_cache_cost_bytes",
            "Summed cost of entries currently held by the cache",
            registry
        )?;

        Ok(Self {
            registry,
            hits,
            misses,
            evictions,
            latency,
            entries,
            cost_bytes,
        })
    }

    /// Snapshot of the store occupancy, refreshed before each scrape.
    pub fn set_store_usage(&self, entries: usize, cost: u64) {
        self.entries.set(i64::try_from(entries).unwrap_or(i64::MAX));
        self.cost_bytes.set(i64::try_from(cost).unwrap_or(i64::MAX));
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn gather(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MetricsError::Encode(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encode(e.to_string()))
    }

    fn observe(&self, kind: &str, latency: Duration) -> Result<(), MetricsError> {
        self.latency
            .get_metric_with_label_values(&[kind])?
            .observe(latency.as_secs_f64());
        Ok(())
    }
}

impl MetricsSink for PrometheusMetrics {
    fn inc_hit(&self) -> Result<(), MetricsError> {
        self.hits.inc();
        Ok(())
    }

    fn inc_miss(&self) -> Result<(), MetricsError> {
        self.misses.inc();
        Ok(())
    }

    fn record_eviction(&self) -> Result<(), MetricsError> {
        self.evictions.inc();
        Ok(())
    }

    fn record_upstream_latency(&self, latency: Duration) -> Result<(), MetricsError> {
        self.observe("upstream", latency)
    }

    fn record_cache_latency(&self, latency: Duration) -> Result<(), MetricsError> {
        self.observe("cache", latency)
    }

    fn record_total_latency(&self, latency: Duration) -> Result<(), MetricsError> {
        self.observe("total", latency)
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn inc_hit(&self) -> Result<(), MetricsError> {
        Ok(())
    }

    fn inc_miss(&self) -> Result<(), MetricsError> {
        Ok(())
    }

    fn record_eviction(&self) -> Result<(), MetricsError> {
        Ok(())
    }

    fn record_upstream_latency(&self, _latency: Duration) -> Result<(), MetricsError> {
        Ok(())
    }

    fn record_cache_latency(&self, _latency: Duration) -> Result<(), MetricsError> {
        Ok(())
    }

    fn record_total_latency(&self, _latency: Duration) -> Result<(), MetricsError> {
        Ok(())
    }
}
