//! Configuration types for the caching proxy.
//!
//! Values come from a YAML file, then environment variables named after the
//! dotted key (`cache.policy.default_ttl_seconds` ->
//! `CACHE_POLICY_DEFAULT_TTL_SECONDS`) override them.

mod cache;
mod origin;
mod server;
mod size;

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use crate::error::ConfigError;
pub use cache::{CacheConfig, CachePolicyConfig};
pub use origin::{ConnectionPoolConfig, OriginConfig};
pub use server::ServerConfig;
pub use size::parse_size;

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub origin: OriginConfig,
}

impl Config {
    /// Parse a YAML file without applying overrides or validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Load the startup configuration: file (when present), then process
    /// environment, then validation.
    ///
    /// A missing file is only an error when `required` is set, i.e. when the
    /// operator named it explicitly.
    pub fn load<P: AsRef<Path>>(path: P, required: bool) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if required || path.exists() {
            Self::from_file(path)?
        } else {
            debug!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SERVER_PORT") {
            self.server.port = v;
        }
        if let Some(v) = lookup("SERVER_PRODUCTION") {
            self.server.production = parse_bool("SERVER_PRODUCTION", &v)?;
        }
        if let Some(v) = lookup("SERVER_BASE_PATH") {
            self.server.base_path = v;
        }

        if let Some(v) = lookup("CACHE_MAX_COST") {
            self.cache.max_cost = v;
        }
        if let Some(v) = lookup("CACHE_NUM_COUNTERS") {
            self.cache.num_counters = parse_env("CACHE_NUM_COUNTERS", &v)?;
        }
        if let Some(v) = lookup("CACHE_BUFFER_ITEMS") {
            self.cache.buffer_items = parse_env("CACHE_BUFFER_ITEMS", &v)?;
        }
        if let Some(v) = lookup("CACHE_SWEEP_INTERVAL_SECONDS") {
            self.cache.sweep_interval_seconds = parse_env("CACHE_SWEEP_INTERVAL_SECONDS", &v)?;
        }

        let policy = &mut self.cache.policy;
        if let Some(v) = lookup("CACHE_POLICY_DEFAULT_TTL_SECONDS") {
            policy.default_ttl_seconds = parse_env("CACHE_POLICY_DEFAULT_TTL_SECONDS", &v)?;
        }
        if let Some(v) = lookup("CACHE_POLICY_RESPECT_NO_CACHE") {
            policy.respect_no_cache = parse_bool("CACHE_POLICY_RESPECT_NO_CACHE", &v)?;
        }
        if let Some(v) = lookup("CACHE_POLICY_RESPECT_NO_STORE") {
            policy.respect_no_store = parse_bool("CACHE_POLICY_RESPECT_NO_STORE", &v)?;
        }
        if let Some(v) = lookup("CACHE_POLICY_REVALIDATE_WINDOW_SECONDS") {
            policy.revalidate_window_seconds =
                parse_env("CACHE_POLICY_REVALIDATE_WINDOW_SECONDS", &v)?;
        }

        if let Some(v) = lookup("ORIGIN_ORIGIN_URL") {
            self.origin.origin_url = v;
        }
        if let Some(v) = lookup("ORIGIN_TIMEOUT_SECONDS") {
            self.origin.timeout_seconds = parse_env("ORIGIN_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = lookup("ORIGIN_HEALTH_PATH") {
            self.origin.health_path = v;
        }
        if let Some(v) = lookup("ORIGIN_TLS_SKIP_VERIFY") {
            self.origin.tls_skip_verify = parse_bool("ORIGIN_TLS_SKIP_VERIFY", &v)?;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_port()?;
        self.cache.validate()?;
        self.origin.base_uri()?;
        Ok(())
    }

    pub fn listen_port(&self) -> Result<u16, ConfigError> {
        self.server
            .port
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid("server.port", &self.server.port, "not a valid port"))
    }
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(name, value, "not a valid number"))
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(name, value, "expected true or false")),
    }
}
