//! Process configuration: compiled defaults, `config/default.toml`, then
//! the environment.

use anyhow::{Context, Result};
use clickhouse_client::ClickHouseConfig;
use metering_core::{DataSourceSpec, ImportDefaults};
use prometheus_api::PrometheusConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

const ENV_PREFIX: &str = "METERING";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    /// Concurrent import runs allowed across all data sources
    #[serde(default = "default_gate_capacity")]
    pub gate_capacity: usize,

    #[serde(default)]
    pub prometheus: PrometheusConfig,

    #[serde(default)]
    pub clickhouse: ClickHouseConfig,

    #[serde(default)]
    pub defaults: ImportDefaults,

    /// Data sources registered at start-up
    #[serde(default)]
    pub data_sources: Vec<DataSourceSpec>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_gate_capacity() -> usize {
    4
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            gate_capacity: default_gate_capacity(),
            prometheus: PrometheusConfig::default(),
            clickhouse: ClickHouseConfig::default(),
            defaults: ImportDefaults::default(),
            data_sources: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Layer the sources and validate the import defaults.
    pub fn load() -> Result<Self> {
        let layered = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let mut config: AppConfig = layered
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.apply_connection_overrides()?;

        config
            .defaults
            .validate()
            .context("Invalid import defaults")?;
        Ok(config)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }

    /// Flat variables for the connection settings, which deployments tend
    /// to inject one by one (`METERING_CLICKHOUSE_PASSWORD` from a secret).
    fn apply_connection_overrides(&mut self) -> Result<()> {
        if let Some(url) = env("PROMETHEUS_URL") {
            self.prometheus.url = url;
        }
        if let Some(token) = env("PROMETHEUS_BEARER_TOKEN") {
            self.prometheus.bearer_token = Some(token);
        }
        if let Some(url) = env("CLICKHOUSE_URL") {
            self.clickhouse.url = url;
        }
        if let Some(database) = env("CLICKHOUSE_DATABASE") {
            self.clickhouse.database = database;
        }
        if let Some(username) = env("CLICKHOUSE_USERNAME") {
            self.clickhouse.username = Some(username);
        }
        if let Some(password) = env("CLICKHOUSE_PASSWORD") {
            self.clickhouse.password = Some(password);
        }
        if let Some(capacity) = env("GATE_CAPACITY") {
            self.gate_capacity = capacity
                .parse()
                .context("METERING_GATE_CAPACITY must be a positive integer")?;
        }
        Ok(())
    }
}

fn env(key: &str) -> Option<String> {
    std::env::var(format!("{}_{}", ENV_PREFIX, key))
        .ok()
        .filter(|v| !v.is_empty())
}
