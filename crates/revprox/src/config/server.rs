//! Listener configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen port, kept as a string the way operators write it.
    #[serde(default = "default_port")]
    pub port: String,
    /// JSON log output for production deployments.
    #[serde(default)]
    pub production: bool,
    /// Prefix for every route, e.g. `/api/v1`.
    #[serde(default = "default_base_path")]
    pub base_path: String,
}

impl ServerConfig {
    /// Base path without a trailing slash; empty when mounted at the root.
    pub fn normalized_base_path(&self) -> String {
        let trimmed = self.base_path.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            production: false,
            base_path: default_base_path(),
        }
    }
}

fn default_port() -> String {
    "8080".to_string()
}

fn default_base_path() -> String {
    "/api/v1".to_string()
}
