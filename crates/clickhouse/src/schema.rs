//! Metric table schema.
//!
//! One row per sample: the value, when it was taken, the step it covers,
//! its label set and a day partition key.

/// DDL for a metric table.
pub fn metric_table_ddl(table: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    amount Float64,
    timestamp DateTime64(3, 'UTC'),
    time_precision Float64,
    labels Map(String, String),
    dt String
)
ENGINE = MergeTree()
PARTITION BY dt
ORDER BY timestamp
"#
    )
}
