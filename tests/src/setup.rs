//! Common test setup functions.

use api::{router, state::AppState};
use axum::Router;
use chrono::{DateTime, Utc};
use clickhouse_client::BatchWriter;
use metering_core::{DataSourceSpec, FixedClock, ImportDefaults};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use worker::{ConcurrencyGate, Coordinator, CoordinatorHandle, ImportContext};

use crate::fixtures::at;
use crate::mocks::{MockBackend, MockStore};

/// Test context with a running coordinator over mock I/O.
///
/// This provides the same production code paths by:
/// - Using the real Axum router with all layers
/// - Using the real coordinator, workers, importers and batch writer
/// - Using `MockBackend`/`MockStore` behind the production traits
pub struct TestContext {
    pub backend: MockBackend,
    pub store: MockStore,
    pub clock: Arc<FixedClock>,
    pub gate: ConcurrencyGate,
    pub coordinator: CoordinatorHandle,
    pub router: Router,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// Knobs for [`TestContext::with_options`].
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub now: DateTime<Utc>,
    pub gate_capacity: usize,
    pub max_statement_bytes: usize,
    pub defaults: ImportDefaults,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            now: at(12, 0),
            gate_capacity: 4,
            max_statement_bytes: clickhouse_client::DEFAULT_MAX_STATEMENT_BYTES,
            defaults: ImportDefaults::default(),
        }
    }
}

impl ContextOptions {
    /// Defaults with a 30 minute max query range, enough for six chunks.
    pub fn wide_range() -> Self {
        Self {
            defaults: ImportDefaults {
                max_query_range_secs: 1800,
                ..ImportDefaults::default()
            },
            ..Self::default()
        }
    }
}

impl TestContext {
    /// Context with default options; "now" is 2019-01-01 12:00 UTC.
    pub async fn new() -> Self {
        Self::with_options(ContextOptions::default()).await
    }

    pub async fn with_options(options: ContextOptions) -> Self {
        let backend = MockBackend::new();
        let store = MockStore::new();
        let clock = Arc::new(FixedClock::new(options.now));
        let gate = ConcurrencyGate::new(options.gate_capacity);
        let cancel = CancellationToken::new();

        let ctx = ImportContext {
            backend: Arc::new(backend.clone()),
            store: Arc::new(store.clone()),
            writer: BatchWriter::new(options.max_statement_bytes),
            clock: clock.clone(),
        };
        let (coordinator, task) =
            Coordinator::spawn(ctx, options.defaults, gate.clone(), cancel.clone());

        let router = router(AppState::new(coordinator.clone()));

        Self {
            backend,
            store,
            clock,
            gate,
            coordinator,
            router,
            cancel,
            task: Some(task),
        }
    }

    /// Register data sources, panicking on rejection.
    pub async fn register(&self, specs: impl IntoIterator<Item = DataSourceSpec>) {
        for spec in specs {
            let name = spec.name.clone();
            self.coordinator
                .upsert_data_source(spec)
                .await
                .unwrap_or_else(|e| panic!("failed to register {}: {}", name, e));
        }
    }

    /// Let spawned workers run their pending ticks.
    pub async fn settle(&self) {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    /// Cancel the coordinator and wait for every worker to stop.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.await.expect("coordinator task panicked");
        }
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("listener has no address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://{}", addr)
}
