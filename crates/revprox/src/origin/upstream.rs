use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderMap, HeaderName, CONTENT_LENGTH, HOST};
use hyper::{Method, Request, Uri};
use std::time::Duration;
use tracing::debug;

use super::client::{create_http_client, HttpClient};
use super::{OriginClient, RequestContext};
use crate::config::{ConfigError, OriginConfig};
use crate::error::OriginError;
use crate::model::{RequestModel, ResponseModel};

/// Connection-scoped headers that never travel across a proxy hop.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Origin client over the pooled hyper client.
pub struct HyperOriginClient {
    client: HttpClient,
    base: Uri,
    health_path: String,
    timeout: Duration,
}

impl HyperOriginClient {
    pub fn new(config: &OriginConfig) -> Result<Self, ConfigError> {
        let base = config.base_uri()?;
        let client = create_http_client(&config.connection_pool, config.tls_skip_verify);

        Ok(Self {
            client,
            base,
            health_path: config.health_path.clone(),
            timeout: config.timeout(),
        })
    }

    /// Join the origin base URL with a request path and query.
    fn target_uri(&self, path_and_query: &str) -> Result<Uri, OriginError> {
        let scheme = self.base.scheme_str().unwrap_or("http");
        let authority = self
            .base
            .authority()
            .map(|a| a.as_str())
            .ok_or_else(|| OriginError::InvalidRequest("origin URL has no host".to_string()))?;
        let prefix = self.base.path().trim_end_matches('/');
        let suffix = if path_and_query.starts_with('/') {
            path_and_query.to_string()
        } else {
            format!("/{path_and_query}")
        };

        format!("{scheme}://{authority}{prefix}{suffix}")
            .parse()
            .map_err(|e| OriginError::InvalidRequest(format!("invalid upstream URL: {e}")))
    }

    fn build_request(&self, request: &RequestModel) -> Result<Request<Full<Bytes>>, OriginError> {
        let path_and_query = request
            .url
            .as_ref()
            .and_then(|u| u.path_and_query())
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let uri = self.target_uri(path_and_query)?;

        debug!("Forwarding to: {}", uri);

        let mut builder = Request::builder().method(request.method.clone()).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            for (name, value) in request.headers.iter() {
                if name != HOST && name != CONTENT_LENGTH && !is_hop_by_hop(name) {
                    headers.append(name.clone(), value.clone());
                }
            }
        }

        builder
            .body(Full::new(request.body.clone()))
            .map_err(|e| OriginError::InvalidRequest(e.to_string()))
    }

    async fn send(&self, request: Request<Full<Bytes>>) -> Result<ResponseModel, OriginError> {
        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| OriginError::Transport(e.to_string()))?;

        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| OriginError::Body(e.to_string()))?
            .to_bytes();

        Ok(ResponseModel::new(
            parts.status,
            end_to_end_headers(parts.headers),
            body,
        ))
    }
}

/// Drop hop-by-hop and framing headers; the body is re-framed on the way out.
fn end_to_end_headers(headers: HeaderMap) -> HeaderMap {
    let mut kept = HeaderMap::with_capacity(headers.len());
    let mut current: Option<HeaderName> = None;
    for (name, value) in headers {
        if let Some(name) = name {
            current = Some(name);
        }
        if let Some(name) = &current {
            if name != CONTENT_LENGTH && !is_hop_by_hop(name) {
                kept.append(name.clone(), value);
            }
        }
    }
    kept
}

#[async_trait]
impl OriginClient for HyperOriginClient {
    async fn fetch(
        &self,
        ctx: &RequestContext,
        request: &RequestModel,
    ) -> Result<ResponseModel, OriginError> {
        let outbound = self.build_request(request)?;
        ctx.bounded_by(self.timeout).run(self.send(outbound)).await
    }

    async fn health_check(&self, ctx: &RequestContext) -> Result<(), OriginError> {
        let uri = self.target_uri(&self.health_path)?;
        let probe = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Full::new(Bytes::new()))
            .map_err(|e| OriginError::InvalidRequest(e.to_string()))?;

        let response = ctx.bounded_by(self.timeout).run(self.send(probe)).await?;
        if response.status.is_server_error() {
            return Err(OriginError::Unhealthy(response.status));
        }
        Ok(())
    }
}
