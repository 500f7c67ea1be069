//! ClickHouse configuration.

use crate::insert::DEFAULT_MAX_STATEMENT_BYTES;
use serde::{Deserialize, Serialize};

/// ClickHouse client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickHouseConfig {
    /// ClickHouse HTTP URL
    #[serde(default = "default_url")]
    pub url: String,
    /// Database name
    #[serde(default = "default_database")]
    pub database: String,
    /// Username (optional)
    #[serde(default)]
    pub username: Option<String>,
    /// Password (optional)
    #[serde(default)]
    pub password: Option<String>,
    /// Upper bound on one INSERT statement, in bytes
    #[serde(default = "default_max_statement_bytes")]
    pub max_statement_bytes: usize,
    /// Create missing metric tables when a data source is registered
    #[serde(default = "default_create_tables")]
    pub create_tables: bool,
}

fn default_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_database() -> String {
    "metering".to_string()
}

fn default_max_statement_bytes() -> usize {
    DEFAULT_MAX_STATEMENT_BYTES
}

fn default_create_tables() -> bool {
    true
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            database: default_database(),
            username: None,
            password: None,
            max_statement_bytes: default_max_statement_bytes(),
            create_tables: default_create_tables(),
        }
    }
}
