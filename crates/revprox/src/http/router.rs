//! Route dispatch for the proxy's HTTP surface.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::handlers;
use super::server::AppState;
use super::types::not_found;
use crate::origin::RequestContext;

/// A resolved route. `Proxy` carries the path forwarded upstream.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Route<'a> {
    Livez,
    Readyz,
    Metrics,
    Proxy(&'a str),
    NotFound,
}

/// Resolve `path` against routes mounted under `base` (no trailing slash,
/// empty for the root).
pub(crate) fn resolve<'a>(base: &str, method: &Method, path: &'a str) -> Route<'a> {
    let Some(rest) = path.strip_prefix(base) else {
        return Route::NotFound;
    };
    if !rest.starts_with('/') {
        return Route::NotFound;
    }

    match (method, rest) {
        (&Method::GET, "/health/livez") => return Route::Livez,
        (&Method::GET, "/health/readyz") => return Route::Readyz,
        (&Method::GET, "/metrics/prometheus") => return Route::Metrics,
        _ => {}
    }

    match rest.strip_prefix("/proxy") {
        Some("") => Route::Proxy("/"),
        Some(upstream) if upstream.starts_with('/') => Route::Proxy(upstream),
        _ => Route::NotFound,
    }
}

pub async fn route_request(
    req: Request<Incoming>,
    remote_addr: SocketAddr,
    state: Arc<AppState>,
    cancel: CancellationToken,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("{} {} from {}", method, path, remote_addr);

    let ctx = RequestContext::new(cancel);
    let response = match resolve(&state.base_path, &method, &path) {
        Route::Livez => handlers::handle_livez(&state),
        Route::Readyz => handlers::handle_readyz(&state, &ctx).await,
        Route::Metrics => handlers::handle_metrics(&state),
        Route::Proxy(upstream) => {
            handlers::handle_proxy(&state, &ctx, req, remote_addr, upstream).await
        }
        Route::NotFound => not_found(),
    };
    Ok(response)
}
