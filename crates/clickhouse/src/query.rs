//! Query functions for reading metric tables back (cursor recovery, tests, admin).

use crate::client::ClickHouseClient;
use chrono::{DateTime, Utc};
use clickhouse::Row;
use metering_core::{validate_table_name, Error, Result};
use serde::Deserialize;

/// A persisted sample.
#[derive(Debug, Clone, Row, Deserialize)]
pub struct MetricRow {
    pub amount: f64,
    pub timestamp_ms: i64,
    pub time_precision: f64,
    pub labels: Vec<(String, String)>,
    pub dt: String,
}

impl MetricRow {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp_ms)
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Newest sample time in a table.
pub async fn last_timestamp(
    client: &ClickHouseClient,
    table: &str,
) -> Result<Option<DateTime<Utc>>> {
    validate_table_name(table)?;

    let sql = format!(
        "SELECT toUnixTimestamp64Milli(timestamp) FROM {} ORDER BY timestamp DESC LIMIT 1",
        table
    );
    let newest: Option<i64> = client
        .inner()
        .query(&sql)
        .fetch_optional()
        .await
        .map_err(|e| Error::storage(format!("Query error: {}", e)))?;

    newest
        .map(|ms| {
            DateTime::from_timestamp_millis(ms)
                .ok_or_else(|| Error::storage(format!("timestamp out of range: {}", ms)))
        })
        .transpose()
}

/// Count all rows in a table.
pub async fn count_metrics(client: &ClickHouseClient, table: &str) -> Result<u64> {
    validate_table_name(table)?;

    let count: u64 = client
        .inner()
        .query(&format!("SELECT count() FROM {}", table))
        .fetch_one()
        .await
        .map_err(|e| Error::storage(format!("Query error: {}", e)))?;
    Ok(count)
}

/// Fetch rows with `start <= timestamp < end`, oldest first.
pub async fn fetch_metrics(
    client: &ClickHouseClient,
    table: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<MetricRow>> {
    validate_table_name(table)?;

    let sql = format!(
        "SELECT amount, toUnixTimestamp64Milli(timestamp) AS timestamp_ms, time_precision, labels, dt \
         FROM {} \
         WHERE timestamp >= fromUnixTimestamp64Milli(toInt64(?), 'UTC') \
         AND timestamp < fromUnixTimestamp64Milli(toInt64(?), 'UTC') \
         ORDER BY timestamp",
        table
    );
    let rows: Vec<MetricRow> = client
        .inner()
        .query(&sql)
        .bind(start.timestamp_millis())
        .bind(end.timestamp_millis())
        .fetch_all()
        .await
        .map_err(|e| Error::storage(format!("Query error: {}", e)))?;
    Ok(rows)
}

/// Remove every row from a table (for testing).
pub async fn truncate_metrics(client: &ClickHouseClient, table: &str) -> Result<()> {
    validate_table_name(table)?;

    client
        .inner()
        .query(&format!("TRUNCATE TABLE IF EXISTS {}", table))
        .execute()
        .await
        .map_err(|e| Error::storage(format!("Truncate error: {}", e)))
}
