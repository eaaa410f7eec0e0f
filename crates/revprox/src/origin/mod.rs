//! Upstream origin access.
//!
//! The pipeline talks to the origin through [`OriginClient`]; every call
//! carries a [`RequestContext`] so a client disconnect or a deadline aborts
//! the upstream fetch.

mod client;
mod context;
mod tls;
mod upstream;

use async_trait::async_trait;

use crate::error::OriginError;
use crate::model::{RequestModel, ResponseModel};

pub use client::{create_http_client, HttpClient};
pub use context::RequestContext;
pub use upstream::HyperOriginClient;

#[async_trait]
pub trait OriginClient: Send + Sync {
    /// Forward `request` to the origin and return its response with status,
    /// headers and body preserved.
    async fn fetch(
        &self,
        ctx: &RequestContext,
        request: &RequestModel,
    ) -> Result<ResponseModel, OriginError>;

    /// Probe the origin.
    async fn health_check(&self, ctx: &RequestContext) -> Result<(), OriginError>;
}
