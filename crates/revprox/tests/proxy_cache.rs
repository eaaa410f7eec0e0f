//! End-to-end tests: a real proxy server in front of an in-process origin.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use reqwest::Client;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use revprox::config::Config;
use revprox::http::ProxyServer;

/// Requests seen by the origin, per path.
#[derive(Clone, Default)]
struct OriginHits(Arc<Mutex<HashMap<String, usize>>>);

impl OriginHits {
    fn record(&self, path: &str) {
        *self.0.lock().entry(path.to_string()).or_insert(0) += 1;
    }

    fn count(&self, path: &str) -> usize {
        self.0.lock().get(path).copied().unwrap_or(0)
    }
}

fn respond(status: StatusCode, headers: &[(&str, &str)], body: String) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(status);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Full::new(Bytes::from(body))).unwrap()
}

async fn origin_handler(
    req: Request<Incoming>,
    hits: OriginHits,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_string();
    hits.record(&path);
    let n = hits.count(&path);

    let response = match path.as_str() {
        "/data" => respond(
            StatusCode::OK,
            &[("cache-control", "max-age=60"), ("content-type", "text/plain")],
            format!("data #{n}"),
        ),
        "/private" => respond(
            StatusCode::OK,
            &[("cache-control", "private, max-age=60")],
            format!("private #{n}"),
        ),
        "/missing" => respond(StatusCode::NOT_FOUND, &[], "missing".to_string()),
        "/slow" => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            respond(StatusCode::OK, &[], "slow".to_string())
        }
        "/echo" => {
            let forwarded_for = req
                .headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-")
                .to_string();
            respond(
                StatusCode::OK,
                &[("cache-control", "max-age=60")],
                format!("{} {} {}", req.method(), forwarded_for, n),
            )
        }
        "/health" => respond(StatusCode::OK, &[], "ok".to_string()),
        _ => respond(StatusCode::NOT_FOUND, &[], String::new()),
    };
    Ok(response)
}

async fn start_origin() -> (SocketAddr, OriginHits) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = OriginHits::default();

    let server_hits = hits.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let hits = server_hits.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| origin_handler(req, hits.clone()));
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    (addr, hits)
}

/// An address nothing listens on.
async fn dead_origin() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

struct TestProxy {
    base: String,
    client: Client,
    shutdown: CancellationToken,
}

impl TestProxy {
    async fn start(origin: SocketAddr) -> Self {
        let mut config = Config::default();
        config.origin.origin_url = format!("http://{origin}");
        config.origin.health_path = "/health".to_string();
        config.origin.timeout_seconds = 1;
        config.validate().unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();

        let server = ProxyServer::new(&config).unwrap();
        tokio::spawn(server.serve(listener, shutdown.clone()));

        Self {
            base: format!("http://{addr}/api/v1"),
            client: Client::builder().no_proxy().build().unwrap(),
            shutdown,
        }
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap()
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn x_cache(response: &reqwest::Response) -> &str {
    response
        .headers()
        .get("x-cache")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

#[tokio::test]
async fn test_second_get_is_served_from_cache() {
    let (origin, hits) = start_origin().await;
    let proxy = TestProxy::start(origin).await;

    let first = proxy.get("/proxy/data").await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(x_cache(&first), "MISS");
    assert_eq!(first.headers().get("content-type").unwrap(), "text/plain");
    assert_eq!(first.text().await.unwrap(), "data #1");

    let second = proxy.get("/proxy/data").await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(x_cache(&second), "HIT");
    assert_eq!(second.text().await.unwrap(), "data #1");

    assert_eq!(hits.count("/data"), 1);
}

#[tokio::test]
async fn test_query_order_shares_cache_entry() {
    let (origin, hits) = start_origin().await;
    let proxy = TestProxy::start(origin).await;

    let first = proxy.get("/proxy/data?a=1&b=2").await;
    assert_eq!(x_cache(&first), "MISS");

    let second = proxy.get("/proxy/data?b=2&a=1").await;
    assert_eq!(x_cache(&second), "HIT");
    assert_eq!(hits.count("/data"), 1);
}

#[tokio::test]
async fn test_private_responses_are_not_cached() {
    let (origin, hits) = start_origin().await;
    let proxy = TestProxy::start(origin).await;

    let first = proxy.get("/proxy/private").await;
    assert_eq!(x_cache(&first), "MISS");
    assert_eq!(first.text().await.unwrap(), "private #1");

    let second = proxy.get("/proxy/private").await;
    assert_eq!(x_cache(&second), "MISS");
    assert_eq!(second.text().await.unwrap(), "private #2");

    assert_eq!(hits.count("/private"), 2);
}

#[tokio::test]
async fn test_origin_status_is_preserved_and_uncached_without_ttl() {
    let (origin, hits) = start_origin().await;
    let proxy = TestProxy::start(origin).await;

    for _ in 0..2 {
        let response = proxy.get("/proxy/missing").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(x_cache(&response), "MISS");
        assert_eq!(response.text().await.unwrap(), "missing");
    }
    assert_eq!(hits.count("/missing"), 2);
}

#[tokio::test]
async fn test_post_is_forwarded_but_not_cached() {
    let (origin, hits) = start_origin().await;
    let proxy = TestProxy::start(origin).await;

    for expected in ["POST 127.0.0.1 1", "POST 127.0.0.1 2"] {
        let response = proxy
            .client
            .post(format!("{}/proxy/echo", proxy.base))
            .body("payload")
            .send()
            .await
            .unwrap();
        assert_eq!(x_cache(&response), "MISS");
        assert!(response.headers().get("x-request-id").is_some());
        assert_eq!(response.text().await.unwrap(), expected);
    }
    assert_eq!(hits.count("/echo"), 2);
}

#[tokio::test]
async fn test_unreachable_origin_returns_bad_gateway() {
    let proxy = TestProxy::start(dead_origin().await).await;

    for _ in 0..2 {
        let response = proxy.get("/proxy/data").await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["error"], "upstream service error");
        assert_eq!(body["status"], 502);
    }
}

#[tokio::test]
async fn test_slow_origin_returns_gateway_timeout() {
    let (origin, _hits) = start_origin().await;
    let proxy = TestProxy::start(origin).await;

    let response = proxy.get("/proxy/slow").await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "upstream request timed out");
}

#[tokio::test]
async fn test_health_endpoints() {
    let (origin, hits) = start_origin().await;
    let proxy = TestProxy::start(origin).await;

    let livez = proxy.get("/health/livez").await;
    assert_eq!(livez.status(), StatusCode::OK);
    assert_eq!(livez.text().await.unwrap(), r#"{"status":"up"}"#);

    let readyz = proxy.get("/health/readyz").await;
    assert_eq!(readyz.status(), StatusCode::OK);
    assert_eq!(readyz.text().await.unwrap(), r#"{"status":"ready"}"#);
    assert_eq!(hits.count("/health"), 1);
}

#[tokio::test]
async fn test_readiness_fails_when_origin_is_down() {
    let proxy = TestProxy::start(dead_origin().await).await;

    let livez = proxy.get("/health/livez").await;
    assert_eq!(livez.status(), StatusCode::OK);

    let readyz = proxy.get("/health/readyz").await;
    assert_eq!(readyz.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = readyz.json().await.unwrap();
    assert_eq!(body["status"], "not ready");
    assert!(body["error"].as_str().unwrap().contains("origin"));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (origin, _hits) = start_origin().await;
    let proxy = TestProxy::start(origin).await;

    proxy.get("/proxy/data").await;
    proxy.get("/proxy/data").await;

    let response = proxy.get("/metrics/prometheus").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/plain; version=0.0.4"
    );
    let text = response.text().await.unwrap();
    assert!(text.contains("caching_proxy_cache_hits_total 1"));
    assert!(text.contains("caching_proxy_cache_misses_total 1"));
    assert!(text.contains("caching_proxy_cache_entries 1"));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let (origin, _hits) = start_origin().await;
    let proxy = TestProxy::start(origin).await;

    let response = proxy.get("/nope").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], 404);

    let response = proxy
        .client
        .request(Method::POST, format!("{}/health/livez", proxy.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
