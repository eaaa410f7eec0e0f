//! Liveness and readiness probes.

use std::sync::Arc;

use crate::error::HealthError;
use crate::origin::{OriginClient, RequestContext};
use crate::store::ResponseStore;

pub struct HealthService {
    store: Arc<dyn ResponseStore>,
    origin: Arc<dyn OriginClient>,
}

impl HealthService {
    pub fn new(store: Arc<dyn ResponseStore>, origin: Arc<dyn OriginClient>) -> Self {
        Self { store, origin }
    }

    /// The process can serve: the cache round-trips a probe entry.
    pub fn liveness(&self) -> Result<(), HealthError> {
        self.store.health_check()?;
        Ok(())
    }

    /// The process can serve useful traffic: cache first, then origin.
    pub async fn readiness(&self, ctx: &RequestContext) -> Result<(), HealthError> {
        self.store.health_check()?;
        self.origin.health_check(ctx).await?;
        Ok(())
    }
}
