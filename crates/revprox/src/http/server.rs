//! Proxy server: wiring of the pipeline collaborators and the accept loop.

use anyhow::Context;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::network::create_reusable_listener;
use super::router::route_request;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::health::HealthService;
use crate::metrics::{MetricsSink, PrometheusMetrics};
use crate::model::CacheEntry;
use crate::origin::{HyperOriginClient, OriginClient};
use crate::pipeline::{PipelineDeps, ProxyPipeline};
use crate::policy::HttpPolicyEvaluator;
use crate::store::{BoundedCache, EvictionCause, ResponseStore};

/// Everything a request handler needs, shared by all connections.
pub(crate) struct AppState {
    pub pipeline: ProxyPipeline,
    pub health: HealthService,
    pub metrics: Arc<PrometheusMetrics>,
    pub cache: Arc<BoundedCache>,
    pub base_path: String,
}

pub struct ProxyServer {
    port: u16,
    sweep_interval: Option<Duration>,
    state: Arc<AppState>,
}

impl ProxyServer {
    /// Build the store, origin client, metrics and pipeline from `config`.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let port = config.listen_port()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let metrics =
            Arc::new(PrometheusMetrics::new().context("Failed to create metrics registry")?);

        let eviction_metrics = Arc::clone(&metrics);
        let cache = Arc::new(
            BoundedCache::new(config.cache.store_config()?, Arc::clone(&clock))
                .with_eviction_listener(Arc::new(
                    move |entry: &CacheEntry, cause: EvictionCause| {
                        trace!(url = %entry.key().normalized_url, ?cause, "Evicted cache entry");
                        if let Err(e) = eviction_metrics.record_eviction() {
                            warn!(metric = "eviction", error = %e, "Failed to record metric");
                        }
                    },
                )),
        );

        let origin: Arc<dyn OriginClient> = Arc::new(
            HyperOriginClient::new(&config.origin).context("Failed to create origin client")?,
        );
        let store: Arc<dyn ResponseStore> = cache.clone();

        let pipeline = ProxyPipeline::new(
            PipelineDeps {
                store: Arc::clone(&store),
                origin: Arc::clone(&origin),
                evaluator: Arc::new(HttpPolicyEvaluator::new(Arc::clone(&clock))),
                metrics: metrics.clone(),
                clock,
            },
            Arc::new(config.cache.policy()),
        );

        Ok(Self {
            port,
            sweep_interval: config.cache.sweep_interval(),
            state: Arc::new(AppState {
                pipeline,
                health: HealthService::new(store, origin),
                metrics,
                cache,
                base_path: config.server.normalized_base_path(),
            }),
        })
    }

    /// Bind `0.0.0.0:{port}` and serve until Ctrl-C.
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = create_reusable_listener(addr)
            .with_context(|| format!("Failed to bind listener on {addr}"))?;

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl-C, shutting down");
                    signal.cancel();
                }
                Err(e) => error!("Failed to listen for shutdown signal: {}", e),
            }
        });

        self.serve(listener, shutdown).await
    }

    /// Serve connections from `listener` until `shutdown` is cancelled.
    ///
    /// Every request runs under a child of `shutdown`, so cancelling it also
    /// aborts in-flight origin fetches.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> anyhow::Result<()> {
        let local_addr = listener.local_addr()?;
        info!(
            "Caching proxy listening on http://{}{}",
            local_addr, self.state.base_path
        );

        if let Some(every) = self.sweep_interval {
            tokio::spawn(sweep_expired(
                Arc::clone(&self.state.cache),
                every,
                shutdown.clone(),
            ));
        }

        loop {
            let (stream, remote_addr) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            let state = Arc::clone(&self.state);
            let shutdown = shutdown.clone();

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let requests = shutdown.clone();
                let service = service_fn(move |req| {
                    route_request(req, remote_addr, Arc::clone(&state), requests.child_token())
                });

                let conn = http1::Builder::new().serve_connection(io, service);
                tokio::pin!(conn);

                let result = tokio::select! {
                    result = conn.as_mut() => result,
                    _ = shutdown.cancelled() => {
                        conn.as_mut().graceful_shutdown();
                        conn.as_mut().await
                    }
                };

                if let Err(err) = result {
                    error!("Error serving HTTP connection from {}: {}", remote_addr, err);
                }
            });
        }

        info!("Caching proxy stopped");
        Ok(())
    }
}

/// Reclaim expired entries every `every` until `shutdown`.
async fn sweep_expired(cache: Arc<BoundedCache>, every: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let purged = cache.purge_expired();
                if purged > 0 {
                    debug!(purged, remaining = cache.len(), "Swept expired cache entries");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::{CacheKey, ResponseModel};
    use crate::store::BoundedCacheConfig;
    use hyper::{HeaderMap, Method, StatusCode};
    use std::time::SystemTime;

    fn config(origin_url: &str) -> Config {
        let mut config = Config::default();
        config.origin.origin_url = origin_url.to_string();
        config
    }

    #[test]
    fn test_new_requires_origin() {
        assert!(ProxyServer::new(&Config::default()).is_err());
    }

    #[test]
    fn test_new_normalizes_base_path() {
        let mut config = config("http://127.0.0.1:9");
        config.server.base_path = "/edge/".to_string();
        let server = ProxyServer::new(&config).unwrap();
        assert_eq!(server.state.base_path, "/edge");
        assert_eq!(server.sweep_interval, Some(Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_reclaims_expired_entries() {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let clock = Arc::new(ManualClock::new(start));
        let cache = Arc::new(BoundedCache::new(BoundedCacheConfig::default(), clock.clone()));

        let key = CacheKey::new(Method::GET, "http://origin/a");
        let payload = ResponseModel::new(StatusCode::OK, HeaderMap::new(), "body");
        cache
            .set(CacheEntry::new(key, payload, Duration::from_secs(5), start))
            .unwrap();
        clock.advance(Duration::from_secs(10));

        let shutdown = CancellationToken::new();
        let sweeper = tokio::spawn(sweep_expired(
            Arc::clone(&cache),
            Duration::from_secs(1),
            shutdown.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(cache.is_empty());

        shutdown.cancel();
        sweeper.await.unwrap();
    }
}
