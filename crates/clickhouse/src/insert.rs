//! Size-capped batch inserts of metric records.
//!
//! Records are rendered as `VALUES` tuples and packed into as few
//! `INSERT INTO <table> VALUES ...` statements as the byte cap allows.

use crate::store::MetricStore;
use metering_core::{Error, MetricRecord, Result};
use std::fmt::Write as _;
use std::time::Instant;
use telemetry::metrics;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default upper bound on one INSERT statement.
pub const DEFAULT_MAX_STATEMENT_BYTES: usize = 1_000_000;

/// Outcome of a successful write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub records: usize,
    pub statements: usize,
}

/// Packs records into size-capped INSERT statements.
#[derive(Debug, Clone, Copy)]
pub struct BatchWriter {
    max_statement_bytes: usize,
}

impl Default for BatchWriter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STATEMENT_BYTES)
    }
}

impl BatchWriter {
    pub fn new(max_statement_bytes: usize) -> Self {
        Self {
            max_statement_bytes,
        }
    }

    pub fn max_statement_bytes(&self) -> usize {
        self.max_statement_bytes
    }

    /// Write `records` to `table`, in order.
    ///
    /// Cancellation is checked before each record; a cancelled write
    /// returns [`Error::Cancelled`] without flushing what it buffered, but
    /// statements already executed stay executed.
    pub async fn write(
        &self,
        cancel: &CancellationToken,
        store: &dyn MetricStore,
        table: &str,
        records: &[MetricRecord],
    ) -> Result<WriteStats> {
        let prefix = format!("INSERT INTO {} ", table);
        let capacity = self.max_statement_bytes.saturating_sub(prefix.len());

        let mut stats = WriteStats::default();
        let mut buffer = String::new();
        let mut buffered = 0usize;

        for record in records {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let tuple = format_tuple(record);

            if !buffer.is_empty() && buffer.len() + 1 + tuple.len() > capacity {
                flush(store, &prefix, &buffer, buffered).await?;
                stats.statements += 1;
                stats.records += buffered;
                buffer.clear();
                buffered = 0;
            }

            let separator = if buffer.is_empty() { "VALUES " } else { "," };
            if buffer.len() + separator.len() + tuple.len() > capacity {
                return Err(Error::RecordTooLarge {
                    size: separator.len() + tuple.len(),
                    capacity,
                });
            }

            buffer.push_str(separator);
            buffer.push_str(&tuple);
            buffered += 1;
        }

        if !buffer.is_empty() {
            flush(store, &prefix, &buffer, buffered).await?;
            stats.statements += 1;
            stats.records += buffered;
        }

        Ok(stats)
    }
}

async fn flush(store: &dyn MetricStore, prefix: &str, values: &str, rows: usize) -> Result<()> {
    let statement = format!("{}{}", prefix, values);
    let start = Instant::now();

    let result = store.execute(&statement).await;

    let elapsed = start.elapsed();
    metrics()
        .statement_latency_ms
        .observe(elapsed.as_millis() as u64);
    match result {
        Ok(()) => metrics().statements_executed.inc(),
        Err(_) => metrics().statement_errors.inc(),
    }

    debug!(
        rows = rows,
        bytes = statement.len(),
        latency_ms = %elapsed.as_millis(),
        "Flushed insert statement"
    );

    result
}

/// Render one record as a `VALUES` tuple:
/// `(amount,'timestamp',step_seconds,{'label':'value',...},'dt')`.
pub fn format_tuple(record: &MetricRecord) -> String {
    let mut out = String::with_capacity(64 + record.labels.len() * 32);

    out.push('(');
    out.push_str(&format_float(record.amount));
    out.push_str(",'");
    out.push_str(&record.timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string());
    out.push_str("',");
    out.push_str(&format_float(
        record.step_size.num_milliseconds() as f64 / 1000.0,
    ));
    out.push_str(",{");
    for (i, (key, value)) in record.labels.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{}:{}", quote(key), quote(value));
    }
    out.push_str("},");
    out.push_str(&quote(&record.dt()));
    out.push(')');

    out
}

fn format_float(v: f64) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else if v == f64::INFINITY {
        "inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        format!("{:?}", v)
    }
}

/// Single-quoted string literal. `?` is written as an escape because the
/// client treats a bare `?` as a bind placeholder.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '?' => out.push_str("\\x3F"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}
