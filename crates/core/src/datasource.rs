//! Data source specifications and the importer configuration derived from them.
//!
//! A data source names what to import (a range query) and where to put it
//! (a metric table). Unset tuning fields fall back to [`ImportDefaults`].

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use validator::Validate;

use crate::error::{Error, Result};

/// Plain or database-qualified ClickHouse identifier.
const TABLE_NAME_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$";

static TABLE_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(TABLE_NAME_PATTERN).expect("invalid table name pattern"));

/// Default query interval (5 minutes).
pub const DEFAULT_QUERY_INTERVAL_SECS: u64 = 300;
/// Default step between samples (1 minute).
pub const DEFAULT_STEP_SIZE_SECS: u64 = 60;
/// Default window size (5 minutes).
pub const DEFAULT_CHUNK_SIZE_SECS: u64 = 300;
/// Default upper bound on the range covered by one cursor-driven run (10 minutes).
pub const DEFAULT_MAX_QUERY_RANGE_SECS: u64 = 600;

/// A declared data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct DataSourceSpec {
    #[validate(length(min = 1, max = 253))]
    pub name: String,
    #[serde(default)]
    pub prometheus: Option<PrometheusImportSpec>,
    #[serde(default)]
    pub aws_billing: Option<AwsBillingSpec>,
}

/// Range-query import settings for a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct PrometheusImportSpec {
    #[validate(length(min = 1))]
    pub query: String,
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    #[validate(range(min = 1))]
    pub chunk_size_secs: Option<u64>,
    #[serde(default)]
    #[validate(range(min = 1))]
    pub step_size_secs: Option<u64>,
    #[serde(default)]
    #[validate(range(min = 1))]
    pub query_interval_secs: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

/// Billing-export source. Accepted and tracked, never imported here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct AwsBillingSpec {
    #[validate(length(min = 1))]
    pub bucket: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

/// Process-wide import defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportDefaults {
    #[serde(default = "default_query_interval_secs")]
    pub query_interval_secs: u64,
    #[serde(default = "default_chunk_size_secs")]
    pub chunk_size_secs: u64,
    #[serde(default = "default_step_size_secs")]
    pub step_size_secs: u64,
    #[serde(default = "default_max_query_range_secs")]
    pub max_query_range_secs: u64,
    /// Backfill this far back when a table is empty.
    #[serde(default)]
    pub backfill_lookback_secs: Option<u64>,
    /// Backfill from this instant when a table is empty.
    #[serde(default)]
    pub import_from: Option<DateTime<Utc>>,
}

fn default_query_interval_secs() -> u64 {
    DEFAULT_QUERY_INTERVAL_SECS
}

fn default_chunk_size_secs() -> u64 {
    DEFAULT_CHUNK_SIZE_SECS
}

fn default_step_size_secs() -> u64 {
    DEFAULT_STEP_SIZE_SECS
}

fn default_max_query_range_secs() -> u64 {
    DEFAULT_MAX_QUERY_RANGE_SECS
}

impl Default for ImportDefaults {
    fn default() -> Self {
        Self {
            query_interval_secs: default_query_interval_secs(),
            chunk_size_secs: default_chunk_size_secs(),
            step_size_secs: default_step_size_secs(),
            max_query_range_secs: default_max_query_range_secs(),
            backfill_lookback_secs: None,
            import_from: None,
        }
    }
}

impl ImportDefaults {
    /// Check the defaults are usable.
    pub fn validate(&self) -> Result<()> {
        if self.query_interval_secs == 0
            || self.chunk_size_secs == 0
            || self.step_size_secs == 0
            || self.max_query_range_secs == 0
        {
            return Err(Error::config("import durations must be at least one second"));
        }
        if self.backfill_lookback_secs.is_some() && self.import_from.is_some() {
            return Err(Error::config(
                "backfill_lookback_secs and import_from are mutually exclusive",
            ));
        }
        Ok(())
    }

    /// Backfill policy these defaults describe.
    pub fn backfill(&self) -> Backfill {
        match (self.backfill_lookback_secs, self.import_from) {
            (_, Some(from)) => Backfill::From(from),
            (Some(secs), None) => Backfill::Lookback(secs_to_duration(secs)),
            (None, None) => Backfill::TwoChunks,
        }
    }
}

/// Where to start when a table holds no rows yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backfill {
    /// Two chunks before now.
    TwoChunks,
    /// A fixed duration before now.
    Lookback(Duration),
    /// A fixed instant.
    From(DateTime<Utc>),
}

impl Backfill {
    pub fn start(&self, now: DateTime<Utc>, chunk_size: Duration) -> DateTime<Utc> {
        match *self {
            Self::TwoChunks => now - chunk_size * 2,
            Self::Lookback(d) => now - d,
            Self::From(t) => t,
        }
    }
}

/// Everything one importer needs to run.
#[derive(Debug, Clone, PartialEq)]
pub struct ImporterConfig {
    pub query: String,
    pub table: String,
    pub chunk_size: Duration,
    pub step_size: Duration,
    pub max_windows: i64,
    pub max_query_range: Duration,
    pub backfill: Backfill,
}

/// An importable data source: importer config plus its tick interval.
#[derive(Debug, Clone, PartialEq)]
pub struct PrometheusImport {
    pub config: ImporterConfig,
    pub interval: std::time::Duration,
}

/// What a data source amounts to once validated.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedSource {
    /// Needs a periodic importer.
    Prometheus(PrometheusImport),
    /// Range import configured but switched off.
    Disabled,
    /// Billing export; handled outside this process.
    AwsBilling,
}

impl ResolvedSource {
    pub fn import(&self) -> Option<&PrometheusImport> {
        match self {
            Self::Prometheus(import) => Some(import),
            _ => None,
        }
    }
}

/// Default metric table for a data source name.
pub fn default_table_name(name: &str) -> String {
    format!("datasource_{}", name.replace(['-', '.'], "_"))
}

/// Check a table identifier.
pub fn validate_table_name(table: &str) -> Result<()> {
    if TABLE_NAME_REGEX.is_match(table) {
        Ok(())
    } else {
        Err(Error::invalid_data_source(format!(
            "invalid table name: {}",
            table
        )))
    }
}

impl DataSourceSpec {
    /// Validate the spec and derive its importer settings.
    pub fn resolve(&self, defaults: &ImportDefaults) -> Result<ResolvedSource> {
        self.validate()
            .map_err(|e| Error::invalid_data_source(format!("{}: {}", self.name, e)))?;

        match (&self.prometheus, &self.aws_billing) {
            (Some(prom), _) => {
                prom.validate()
                    .map_err(|e| Error::invalid_data_source(format!("{}: {}", self.name, e)))?;
                if !prom.enabled {
                    return Ok(ResolvedSource::Disabled);
                }
                Ok(ResolvedSource::Prometheus(self.prometheus_import(prom, defaults)?))
            }
            (None, Some(billing)) => {
                billing
                    .validate()
                    .map_err(|e| Error::invalid_data_source(format!("{}: {}", self.name, e)))?;
                Ok(ResolvedSource::AwsBilling)
            }
            (None, None) => Err(Error::invalid_data_source(format!(
                "{}: datasource has neither a prometheus nor an awsBilling section",
                self.name
            ))),
        }
    }

    fn prometheus_import(
        &self,
        prom: &PrometheusImportSpec,
        defaults: &ImportDefaults,
    ) -> Result<PrometheusImport> {
        let table = prom
            .table_name
            .clone()
            .unwrap_or_else(|| default_table_name(&self.name));
        validate_table_name(&table)?;

        let chunk_secs = prom.chunk_size_secs.unwrap_or(defaults.chunk_size_secs);
        let step_secs = prom.step_size_secs.unwrap_or(defaults.step_size_secs);
        let interval_secs = prom
            .query_interval_secs
            .unwrap_or(defaults.query_interval_secs);

        if chunk_secs > defaults.max_query_range_secs {
            return Err(Error::invalid_data_source(format!(
                "{}: chunk size {}s exceeds max query range {}s",
                self.name, chunk_secs, defaults.max_query_range_secs
            )));
        }

        let max_windows = (defaults.max_query_range_secs / chunk_secs).max(1) as i64;

        Ok(PrometheusImport {
            config: ImporterConfig {
                query: prom.query.clone(),
                table,
                chunk_size: secs_to_duration(chunk_secs),
                step_size: secs_to_duration(step_secs),
                max_windows,
                max_query_range: secs_to_duration(defaults.max_query_range_secs),
                backfill: defaults.backfill(),
            },
            interval: std::time::Duration::from_secs(interval_secs),
        })
    }
}

fn secs_to_duration(secs: u64) -> Duration {
    Duration::seconds(secs.min(i64::MAX as u64 / 1000) as i64)
}
