//! Cache sizing and policy configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::size::parse_size;
use super::ConfigError;
use crate::model::CachePolicy;
use crate::store::BoundedCacheConfig;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CacheConfig {
    /// Cost budget as a human-readable size.
    #[serde(default = "default_max_cost")]
    pub max_cost: String,
    /// Maximum number of keys held at once.
    #[serde(default = "default_num_counters")]
    pub num_counters: usize,
    /// Number of lock stripes in the store.
    #[serde(default = "default_buffer_items")]
    pub buffer_items: usize,
    /// Interval of the background expiry sweep (0 = disabled).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    #[serde(default)]
    pub policy: CachePolicyConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CachePolicyConfig {
    #[serde(default)]
    pub default_ttl_seconds: u64,
    #[serde(default)]
    pub respect_no_cache: bool,
    #[serde(default)]
    pub respect_no_store: bool,
    #[serde(default)]
    pub revalidate_window_seconds: u64,
}

impl CacheConfig {
    pub fn max_cost_bytes(&self) -> Result<u64, ConfigError> {
        parse_size(&self.max_cost)
    }

    pub fn store_config(&self) -> Result<BoundedCacheConfig, ConfigError> {
        Ok(BoundedCacheConfig {
            max_cost: self.max_cost_bytes()?,
            num_counters: self.num_counters,
            shards: self.buffer_items,
        })
    }

    pub fn policy(&self) -> CachePolicy {
        CachePolicy {
            default_ttl: Duration::from_secs(self.policy.default_ttl_seconds),
            respect_no_cache: self.policy.respect_no_cache,
            respect_no_store: self.policy.respect_no_store,
            revalidate_window: Duration::from_secs(self.policy.revalidate_window_seconds),
        }
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_seconds > 0).then(|| Duration::from_secs(self.sweep_interval_seconds))
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        let max_cost = self.max_cost_bytes()?;
        if max_cost == 0 {
            return Err(ConfigError::invalid(
                "cache.max_cost",
                &self.max_cost,
                "must be greater than zero",
            ));
        }
        if self.num_counters == 0 {
            return Err(ConfigError::invalid("cache.num_counters", "0", "must be greater than zero"));
        }
        if self.buffer_items == 0 {
            return Err(ConfigError::invalid("cache.buffer_items", "0", "must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cost: default_max_cost(),
            num_counters: default_num_counters(),
            buffer_items: default_buffer_items(),
            sweep_interval_seconds: default_sweep_interval(),
            policy: CachePolicyConfig::default(),
        }
    }
}

fn default_max_cost() -> String {
    "100MB".to_string()
}

fn default_num_counters() -> usize {
    1_000_000
}

fn default_buffer_items() -> usize {
    64
}

fn default_sweep_interval() -> u64 {
    60
}
