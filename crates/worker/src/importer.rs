//! Resumable importer for one data source.
//!
//! The importer owns a cursor: the end of the newest window it knows was
//! fully written. A cursor-driven run starts one step after it, plans
//! windows, and for each window queries the backend and writes the result.
//! Runs are serialized by the importer's mutex, and so are config updates.

use chrono::{DateTime, Utc};
use clickhouse_client::{BatchWriter, MetricStore};
use metering_core::{
    plan_windows, records_from_matrix, Clock, Error, ImporterConfig, TimeWindow,
};
use prometheus_api::MetricsBackend;
use std::sync::Arc;
use std::time::Instant;
use telemetry::{health, metrics, DataSourceMetrics};
use thiserror::Error as ThisError;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Collaborators shared by every importer in the process.
#[derive(Clone)]
pub struct ImportContext {
    pub backend: Arc<dyn MetricsBackend>,
    pub store: Arc<dyn MetricStore>,
    pub writer: BatchWriter,
    pub clock: Arc<dyn Clock>,
}

/// What a finished run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub windows: usize,
    pub metrics_imported: usize,
    pub last_window_end: Option<DateTime<Utc>>,
}

/// A run that stopped early, with how far it got.
#[derive(Debug, ThisError)]
#[error("import stopped after {windows_processed} window(s): {source}")]
pub struct ImportError {
    pub windows_processed: usize,
    #[source]
    pub source: Error,
}

impl ImportError {
    fn new(windows_processed: usize, source: Error) -> Self {
        Self {
            windows_processed,
            source,
        }
    }

    pub fn into_inner(self) -> Error {
        self.source
    }
}

pub type RunResult = std::result::Result<ImportSummary, ImportError>;

struct ImporterState {
    config: ImporterConfig,
    last_timestamp: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy)]
enum RunKind {
    Cursor,
    Range,
}

/// Imports one data source's range query into its metric table.
pub struct PrometheusImporter {
    name: String,
    ctx: ImportContext,
    metrics: Arc<DataSourceMetrics>,
    state: Mutex<ImporterState>,
}

impl PrometheusImporter {
    pub fn new(name: impl Into<String>, config: ImporterConfig, ctx: ImportContext) -> Self {
        let name = name.into();
        let metrics = metrics().data_source(&name);
        Self {
            name,
            ctx,
            metrics,
            state: Mutex::new(ImporterState {
                config,
                last_timestamp: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current cursor. Waits for an in-flight run to finish.
    pub async fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.last_timestamp
    }

    /// Current config. Waits for an in-flight run to finish.
    pub async fn config(&self) -> ImporterConfig {
        self.state.lock().await.config.clone()
    }

    /// Replace the config. A new target table invalidates the cursor.
    pub async fn update_config(&self, config: ImporterConfig) {
        let mut state = self.state.lock().await;
        if state.config.table != config.table {
            state.last_timestamp = None;
        }
        info!(
            data_source = %self.name,
            table = %config.table,
            chunk_secs = config.chunk_size.num_seconds(),
            step_secs = config.step_size.num_seconds(),
            "Importer config updated"
        );
        state.config = config;
    }

    /// Import from the cursor up to now, recovering the cursor from the
    /// table first if it is unknown.
    pub async fn import_from_cursor(
        &self,
        cancel: &CancellationToken,
        allow_incomplete: bool,
    ) -> RunResult {
        let mut state = self.state.lock().await;
        let end = self.ctx.clock.now();

        if state.last_timestamp.is_none() {
            debug!(data_source = %self.name, table = %state.config.table, "Cursor unknown, querying table");
            match self.ctx.store.last_timestamp(&state.config.table).await {
                Ok(newest) => state.last_timestamp = newest,
                Err(e) => {
                    health().clickhouse.set_unhealthy(e.to_string());
                    error!(
                        data_source = %self.name,
                        table = %state.config.table,
                        error = %e,
                        "Unable to recover cursor"
                    );
                    self.metrics.imports_failed.inc();
                    return Err(ImportError::new(0, e));
                }
            }
        }

        let start = match state.last_timestamp {
            Some(last) => last + state.config.step_size,
            None => {
                debug!(data_source = %self.name, "No rows yet, backfilling");
                state.config.backfill.start(end, state.config.chunk_size)
            }
        };

        self.run(&mut state, cancel, start, end, allow_incomplete, RunKind::Cursor)
            .await
    }

    /// Import an explicit range, regardless of the cursor. The range cap
    /// and window limit still apply.
    pub async fn import_range(
        &self,
        cancel: &CancellationToken,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        allow_incomplete: bool,
    ) -> RunResult {
        let mut state = self.state.lock().await;
        self.run(&mut state, cancel, start, end, allow_incomplete, RunKind::Range)
            .await
    }

    /// Clamp `end` so the run spans at most `max_query_range`.
    fn cap_range(
        &self,
        config: &ImporterConfig,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let max_range = config.max_query_range;
        if max_range <= chrono::Duration::zero() || end - start <= max_range {
            return end;
        }
        let capped = start + max_range;
        warn!(
            data_source = %self.name,
            start = %start,
            end = %end,
            capped_end = %capped,
            "Range exceeds max query range, capping"
        );
        capped
    }

    async fn run(
        &self,
        state: &mut ImporterState,
        cancel: &CancellationToken,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        allow_incomplete: bool,
        kind: RunKind,
    ) -> RunResult {
        let config = &state.config;
        let end = self.cap_range(config, start, end);
        let windows = plan_windows(
            start,
            end,
            config.chunk_size,
            config.step_size,
            config.max_windows,
            allow_incomplete,
        );

        let (Some(first), Some(last)) = (windows.first(), windows.last()) else {
            info!(data_source = %self.name, table = %config.table, "No time ranges to query yet");
            return Ok(ImportSummary::default());
        };
        debug!(
            data_source = %self.name,
            range_begin = %first.start,
            range_end = %last.end,
            windows = windows.len(),
            "Planned import"
        );

        let started = Instant::now();
        self.metrics.imports_total.inc();

        let mut summary = ImportSummary::default();
        let mut outcome = Ok(());
        for window in &windows {
            match self.import_window(config, cancel, window).await {
                Ok(imported) => {
                    summary.windows += 1;
                    summary.metrics_imported += imported;
                    summary.last_window_end = Some(window.end);
                }
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        self.metrics
            .import_latency_ms
            .observe(started.elapsed().as_millis() as u64);

        match outcome {
            Ok(()) => {
                if let Some(end) = summary.last_window_end {
                    self.advance_cursor(state, kind, end);
                }
                info!(
                    data_source = %self.name,
                    table = %state.config.table,
                    metrics = summary.metrics_imported,
                    windows = summary.windows,
                    range_begin = %first.start,
                    range_end = %last.end,
                    "Import complete"
                );
                Ok(summary)
            }
            Err(Error::Cancelled) => {
                // Windows that finished are durable; the one in flight is not counted.
                if let Some(end) = summary.last_window_end {
                    self.advance_cursor(state, kind, end);
                }
                info!(
                    data_source = %self.name,
                    windows = summary.windows,
                    "Import cancelled"
                );
                Err(ImportError::new(summary.windows, Error::Cancelled))
            }
            Err(e) => {
                // Cannot tell how much of the failed window landed.
                state.last_timestamp = None;
                self.metrics.imports_failed.inc();
                error!(
                    data_source = %self.name,
                    table = %state.config.table,
                    windows = summary.windows,
                    error = %e,
                    "Import failed"
                );
                Err(ImportError::new(summary.windows, e))
            }
        }
    }

    /// Range runs never move the cursor backwards.
    fn advance_cursor(&self, state: &mut ImporterState, kind: RunKind, end: DateTime<Utc>) {
        if let (RunKind::Range, Some(current)) = (kind, state.last_timestamp) {
            if current > end {
                return;
            }
        }
        state.last_timestamp = Some(end);
        self.metrics.set_last_imported(end);
    }

    async fn import_window(
        &self,
        config: &ImporterConfig,
        cancel: &CancellationToken,
        window: &TimeWindow,
    ) -> metering_core::Result<usize> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        debug!(data_source = %self.name, window = %window, "Querying backend");
        self.metrics.backend_queries_total.inc();
        let query_start = Instant::now();
        let matrix = self
            .ctx
            .backend
            .query_range(&config.query, window)
            .await
            .inspect_err(|e| {
                self.metrics.backend_queries_failed.inc();
                if matches!(e, Error::Backend(_)) {
                    health().prometheus.set_unhealthy(e.to_string());
                }
            })?;
        health().prometheus.set_healthy();
        self.metrics
            .query_latency_ms
            .observe(query_start.elapsed().as_millis() as u64);

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let records = records_from_matrix(window, matrix);
        self.metrics.metrics_scraped.inc_by(records.len() as u64);
        if records.is_empty() {
            debug!(data_source = %self.name, window = %window, "Got 0 metrics");
            return Ok(0);
        }

        self.metrics.store_writes_total.inc();
        let store_start = Instant::now();
        let stats = self
            .ctx
            .writer
            .write(cancel, self.ctx.store.as_ref(), &config.table, &records)
            .await
            .inspect_err(|e| match e {
                Error::Cancelled => {}
                Error::Storage(_) => {
                    self.metrics.store_writes_failed.inc();
                    health().clickhouse.set_unhealthy(e.to_string());
                }
                _ => self.metrics.store_writes_failed.inc(),
            })?;
        health().clickhouse.set_healthy();
        self.metrics
            .store_latency_ms
            .observe(store_start.elapsed().as_millis() as u64);
        self.metrics.metrics_imported.inc_by(stats.records as u64);

        debug!(
            data_source = %self.name,
            window = %window,
            metrics = stats.records,
            statements = stats.statements,
            "Stored window"
        );
        Ok(stats.records)
    }
}
