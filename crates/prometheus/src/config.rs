//! Metrics backend configuration.

use serde::{Deserialize, Serialize};

/// Range-query client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Base URL of the query API
    #[serde(default = "default_url")]
    pub url: String,
    /// Bearer token sent with every request (optional)
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_url() -> String {
    "http://localhost:9090".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            bearer_token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}
