//! Metric records and the range-query result they are decoded from.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use crate::window::TimeWindow;

/// One sample of a series at a point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePair {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// A labelled series as returned by a range query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleStream {
    pub metric: BTreeMap<String, String>,
    pub values: Vec<SamplePair>,
}

/// Result of a range query: zero or more series.
pub type Matrix = Vec<SampleStream>;

/// One observation ready to be written to a metric table.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub labels: BTreeMap<String, String>,
    pub amount: f64,
    pub step_size: Duration,
    pub timestamp: DateTime<Utc>,
}

impl MetricRecord {
    /// Partition key for the record (`YYYY-MM-DD`, UTC).
    pub fn dt(&self) -> String {
        self.timestamp.format("%Y-%m-%d").to_string()
    }
}

/// Flatten a range-query matrix into records, one per sample.
///
/// Every record carries the full label set of its series and the window's
/// step, in series order then sample order.
pub fn records_from_matrix(window: &TimeWindow, matrix: Matrix) -> Vec<MetricRecord> {
    let total = matrix.iter().map(|s| s.values.len()).sum();
    let mut records = Vec::with_capacity(total);

    for stream in matrix {
        for sample in &stream.values {
            records.push(MetricRecord {
                labels: stream.metric.clone(),
                amount: sample.value,
                step_size: window.step,
                timestamp: sample.timestamp,
            });
        }
    }

    records
}
