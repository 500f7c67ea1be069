//! Metering importer
//!
//! Periodically imports range-query results from a Prometheus-compatible
//! backend into per-data-source ClickHouse tables:
//! - One resumable importer and worker per configured data source
//! - A process-wide cap on concurrent imports
//! - An HTTP trigger for importing an explicit time range

mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use api::{router, AppState};
use clickhouse_client::{BatchWriter, ClickHouseClient};
use metering_core::{ResolvedSource, SystemClock};
use prometheus_api::PrometheusClient;
use telemetry::{health, init_tracing_from_env, ComponentHealth};
use worker::{ConcurrencyGate, Coordinator, CoordinatorHandle, ImportContext};

use crate::config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing_from_env();

    info!("Starting metering importer v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load()?;
    info!(
        prometheus = %config.prometheus.url,
        clickhouse = %config.clickhouse.url,
        data_sources = config.data_sources.len(),
        gate_capacity = config.gate_capacity,
        "Loaded config"
    );

    let prometheus = Arc::new(
        PrometheusClient::new(config.prometheus.clone())
            .context("Failed to create metrics backend client")?,
    );
    let clickhouse = Arc::new(
        ClickHouseClient::new(config.clickhouse.clone())
            .context("Failed to create ClickHouse client")?,
    );

    record_health(
        &health().prometheus,
        prometheus_api::health::check_connection(&prometheus).await,
    );
    record_health(
        &health().clickhouse,
        clickhouse_client::health::check_connection(&clickhouse).await,
    );

    if config.clickhouse.create_tables {
        ensure_tables(&config, &clickhouse).await;
    }

    let shutdown = CancellationToken::new();
    let ctx = ImportContext {
        backend: prometheus,
        store: clickhouse.clone(),
        writer: BatchWriter::new(config.clickhouse.max_statement_bytes),
        clock: Arc::new(SystemClock),
    };
    let (coordinator, coordinator_task) = Coordinator::spawn(
        ctx,
        config.defaults.clone(),
        ConcurrencyGate::new(config.gate_capacity),
        shutdown.clone(),
    );
    register_data_sources(&config, &coordinator).await;

    let addr = config.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Serving API on http://{}", addr);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, router(AppState::new(coordinator)))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            server_shutdown.cancel();
        })
        .await
        .context("API server failed")?;

    // Also reached when the server exits without a signal.
    info!("Stopping workers");
    shutdown.cancel();
    if let Err(e) = coordinator_task.await {
        error!("Coordinator task failed: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

fn record_health(component: &ComponentHealth, reachable: bool) {
    if reachable {
        component.set_healthy();
        info!(component = component.name(), "Dependency reachable");
    } else {
        component.set_unhealthy("Connection failed");
        error!(component = component.name(), "Dependency unreachable");
    }
}

/// Create the metric table of every configured, importable data source.
async fn ensure_tables(config: &AppConfig, clickhouse: &ClickHouseClient) {
    for spec in &config.data_sources {
        let Ok(ResolvedSource::Prometheus(import)) = spec.resolve(&config.defaults) else {
            continue;
        };
        if let Err(e) =
            clickhouse_client::health::ensure_metric_table(clickhouse, &import.config.table).await
        {
            // Imports into a missing table fail and retry on every tick.
            warn!(data_source = %spec.name, "Failed to create metric table: {}", e);
        }
    }
}

async fn register_data_sources(config: &AppConfig, coordinator: &CoordinatorHandle) {
    for spec in &config.data_sources {
        if let Err(e) = coordinator.upsert_data_source(spec.clone()).await {
            // Other sources still run; a bad one is reported and skipped.
            error!(data_source = %spec.name, "Data source rejected: {}", e);
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
