//! Internal metrics collection.
//!
//! Process-wide counters plus one set of import counters per data source,
//! exposed as a JSON snapshot.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Histogram for latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (i, &bound) in Self::BUCKET_BOUNDS.iter().enumerate() {
            if ms <= bound {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        // Value exceeds all buckets, add to last
        self.buckets[10].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns bucket counts.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Import counters for one data source.
#[derive(Debug, Default)]
pub struct DataSourceMetrics {
    pub imports_total: Counter,
    pub imports_failed: Counter,
    pub backend_queries_total: Counter,
    pub backend_queries_failed: Counter,
    pub store_writes_total: Counter,
    pub store_writes_failed: Counter,
    pub metrics_scraped: Counter,
    pub metrics_imported: Counter,

    pub import_latency_ms: Histogram,
    pub query_latency_ms: Histogram,
    pub store_latency_ms: Histogram,

    /// End of the newest imported window, unix millis; 0 until the first success.
    last_imported_ms: AtomicI64,
}

impl DataSourceMetrics {
    pub fn set_last_imported(&self, at: DateTime<Utc>) {
        self.last_imported_ms
            .store(at.timestamp_millis(), Ordering::Relaxed);
    }

    pub fn last_imported(&self) -> Option<DateTime<Utc>> {
        match self.last_imported_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => DateTime::from_timestamp_millis(ms),
        }
    }
}

/// Collected metrics for the metering importer.
#[derive(Debug, Default)]
pub struct Metrics {
    // Statement-level storage metrics
    pub statements_executed: Counter,
    pub statement_errors: Counter,
    pub statement_latency_ms: Histogram,

    // Gate
    pub running_imports: Gauge,
    pub gate_waits: Counter,

    // Coordinator
    pub active_workers: Gauge,
    pub adhoc_imports: Counter,

    data_sources: RwLock<BTreeMap<String, Arc<DataSourceMetrics>>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters for a data source, created on first use.
    pub fn data_source(&self, name: &str) -> Arc<DataSourceMetrics> {
        if let Some(existing) = self.data_sources.read().get(name) {
            return existing.clone();
        }
        self.data_sources
            .write()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Forget a data source's counters.
    pub fn remove_data_source(&self, name: &str) {
        self.data_sources.write().remove(name);
    }
}

/// Per-data-source part of a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceSnapshot {
    pub name: String,
    pub imports_total: u64,
    pub imports_failed: u64,
    pub backend_queries_total: u64,
    pub backend_queries_failed: u64,
    pub store_writes_total: u64,
    pub store_writes_failed: u64,
    pub metrics_scraped: u64,
    pub metrics_imported: u64,
    pub import_latency_mean_ms: f64,
    pub query_latency_mean_ms: f64,
    pub store_latency_mean_ms: f64,
    pub last_imported: Option<DateTime<Utc>>,
    /// Seconds between the snapshot and `last_imported`; grows while a source is stalled.
    pub lag_seconds: Option<i64>,
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub statements_executed: u64,
    pub statement_errors: u64,
    pub statement_latency_mean_ms: f64,
    pub running_imports: u64,
    pub gate_waits: u64,
    pub active_workers: u64,
    pub adhoc_imports: u64,
    pub data_sources: Vec<DataSourceSnapshot>,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = Utc::now();
        let data_sources = self
            .data_sources
            .read()
            .iter()
            .map(|(name, m)| {
                let last_imported = m.last_imported();
                DataSourceSnapshot {
                    name: name.clone(),
                    imports_total: m.imports_total.get(),
                    imports_failed: m.imports_failed.get(),
                    backend_queries_total: m.backend_queries_total.get(),
                    backend_queries_failed: m.backend_queries_failed.get(),
                    store_writes_total: m.store_writes_total.get(),
                    store_writes_failed: m.store_writes_failed.get(),
                    metrics_scraped: m.metrics_scraped.get(),
                    metrics_imported: m.metrics_imported.get(),
                    import_latency_mean_ms: m.import_latency_ms.mean(),
                    query_latency_mean_ms: m.query_latency_ms.mean(),
                    store_latency_mean_ms: m.store_latency_ms.mean(),
                    last_imported,
                    lag_seconds: last_imported.map(|t| (now - t).num_seconds()),
                }
            })
            .collect();

        MetricsSnapshot {
            timestamp: now,
            statements_executed: self.statements_executed.get(),
            statement_errors: self.statement_errors.get(),
            statement_latency_mean_ms: self.statement_latency_ms.mean(),
            running_imports: self.running_imports.get(),
            gate_waits: self.gate_waits.get(),
            active_workers: self.active_workers.get(),
            adhoc_imports: self.adhoc_imports.get(),
            data_sources,
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
