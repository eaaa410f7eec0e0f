//! Caching HTTP reverse proxy.
//!
//! Requests under `{base_path}/proxy/` are answered from a cost-bounded
//! in-memory cache when possible and forwarded to a single origin otherwise.
//! Responses are stored according to their `Cache-Control`/`Expires`
//! headers and the configured default TTL.

pub mod clock;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod origin;
pub mod pipeline;
pub mod policy;
pub mod store;
