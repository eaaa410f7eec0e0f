//! HTTP surface: listener, routing and the proxy/health/metrics endpoints.

mod handlers;
mod headers;
mod network;
mod router;
mod server;
mod types;

pub use headers::{ProxyHeadersExt, X_CACHE, X_REQUEST_ID};
pub use network::create_reusable_listener;
pub use server::ProxyServer;
