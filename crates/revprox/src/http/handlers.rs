//! Endpoint handlers.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::HOST;
use hyper::{HeaderMap, Request, Response, StatusCode, Uri};
use std::net::SocketAddr;
use tracing::{error, warn};

use super::headers::{ProxyHeadersExt, X_CACHE, X_REQUEST_ID};
use super::server::AppState;
use super::types::{
    build_response_with_headers, collect_body, error_response, json_response, HealthResponse,
};
use crate::model::RequestModel;
use crate::origin::RequestContext;
use crate::pipeline::ServedResponse;

pub fn handle_livez(state: &AppState) -> Response<Full<Bytes>> {
    match state.health.liveness() {
        Ok(()) => json_response(StatusCode::OK, &HealthResponse::ok("up")),
        Err(e) => {
            warn!(error = %e, "Liveness check failed");
            json_response(
                StatusCode::SERVICE_UNAVAILABLE,
                &HealthResponse::failed("down", e),
            )
        }
    }
}

pub async fn handle_readyz(state: &AppState, ctx: &RequestContext) -> Response<Full<Bytes>> {
    match state.health.readiness(ctx).await {
        Ok(()) => json_response(StatusCode::OK, &HealthResponse::ok("ready")),
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            json_response(
                StatusCode::SERVICE_UNAVAILABLE,
                &HealthResponse::failed("not ready", e),
            )
        }
    }
}

pub fn handle_metrics(state: &AppState) -> Response<Full<Bytes>> {
    state
        .metrics
        .set_store_usage(state.cache.len(), state.cache.cost());

    match state.metrics.gather() {
        Ok(text) => build_response_with_headers(
            StatusCode::OK,
            [("Content-Type", "text/plain; version=0.0.4")],
            text,
        ),
        Err(e) => {
            error!(error = %e, "Failed to gather metrics");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to gather metrics")
        }
    }
}

pub async fn handle_proxy(
    state: &AppState,
    ctx: &RequestContext,
    req: Request<Incoming>,
    remote_addr: SocketAddr,
    upstream_path: &str,
) -> Response<Full<Bytes>> {
    let url = match absolute_url(req.headers(), req.uri(), upstream_path) {
        Ok(url) => url,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, &message),
    };
    let method = req.method().clone();
    let headers = req.headers().clone();
    let body = match collect_body(req).await {
        Ok(body) => body,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, &message),
    };

    let mut request = RequestModel::new(method, url)
        .with_client_ip(remote_addr.ip())
        .with_body(body);
    request.headers = headers;

    let mut response = match state.pipeline.serve(ctx, &request).await {
        Ok(served) => into_response(served),
        Err(e) => error_response(e.status(), e.public_message()),
    };
    response.set_header_value(&X_REQUEST_ID, &request.id);
    response
}

/// The URL the client addressed: `Host` header (or request authority),
/// the path below the proxy prefix and the original query.
fn absolute_url(headers: &HeaderMap, uri: &Uri, upstream_path: &str) -> Result<Uri, String> {
    let host = headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or("localhost");

    let url = match uri.query() {
        Some(query) => format!("http://{host}{upstream_path}?{query}"),
        None => format!("http://{host}{upstream_path}"),
    };
    url.parse()
        .map_err(|e| format!("Invalid request URL {url:?}: {e}"))
}

fn into_response(served: ServedResponse) -> Response<Full<Bytes>> {
    let ServedResponse {
        response: model,
        cache_status,
    } = served;

    let mut response = Response::new(Full::new(model.body));
    *response.status_mut() = model.status;
    *response.headers_mut() = model.headers;
    response.set_header_value(&X_CACHE, cache_status.as_str());
    response
}
