//! Origin and connection pool configuration.

use hyper::Uri;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ConfigError;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct OriginConfig {
    /// Base URL of the single upstream, e.g. `http://backend:9000`.
    #[serde(default)]
    pub origin_url: String,
    /// Per-request budget for the upstream call.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Path probed by the readiness check.
    #[serde(default = "default_health_path")]
    pub health_path: String,
    /// Skip TLS certificate verification (for self-signed certs in dev/test)
    #[serde(default)]
    pub tls_skip_verify: bool,
    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,
}

impl OriginConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// The origin URL, parsed and checked for an http(s) scheme and a host.
    pub fn base_uri(&self) -> Result<Uri, ConfigError> {
        if self.origin_url.trim().is_empty() {
            return Err(ConfigError::MissingOrigin);
        }

        let uri: Uri = self.origin_url.trim().parse().map_err(|e| {
            ConfigError::invalid("origin.origin_url", &self.origin_url, &format!("{e}"))
        })?;

        match uri.scheme_str() {
            Some("http") | Some("https") => {}
            _ => {
                return Err(ConfigError::invalid(
                    "origin.origin_url",
                    &self.origin_url,
                    "scheme must be http or https",
                ))
            }
        }

        if uri.host().map_or(true, str::is_empty) {
            return Err(ConfigError::invalid(
                "origin.origin_url",
                &self.origin_url,
                "missing host",
            ));
        }

        Ok(uri)
    }
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            origin_url: String::new(),
            timeout_seconds: default_timeout(),
            health_path: default_health_path(),
            tls_skip_verify: false,
            connection_pool: ConnectionPoolConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ConnectionPoolConfig {
    #[serde(default = "default_pool_max_idle_per_host")]
    pub max_idle_per_host: usize,

    #[serde(default = "default_pool_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_keepalive_timeout")]
    pub keepalive_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: default_pool_max_idle_per_host(),
            idle_timeout_secs: default_pool_idle_timeout(),
            keepalive_timeout_secs: default_keepalive_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_health_path() -> String {
    "/".to_string()
}

fn default_pool_max_idle_per_host() -> usize {
    100
}

fn default_pool_idle_timeout() -> u64 {
    90
}

fn default_keepalive_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin(url: &str) -> OriginConfig {
        OriginConfig {
            origin_url: url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_origins() {
        assert!(origin("http://backend:9000").base_uri().is_ok());
        assert!(origin("https://api.example.com/base").base_uri().is_ok());
    }

    #[test]
    fn test_missing_origin() {
        assert!(matches!(
            origin("  ").base_uri(),
            Err(ConfigError::MissingOrigin)
        ));
    }

    #[test]
    fn test_rejects_non_http_schemes_and_relative_urls() {
        assert!(origin("ftp://files.example.com").base_uri().is_err());
        assert!(origin("/relative/path").base_uri().is_err());
    }
}
