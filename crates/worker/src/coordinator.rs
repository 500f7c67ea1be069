//! The coordinator: owner of every data source's worker.
//!
//! A single task holds the worker map and mutates it only in response to
//! [`Command`]s sent through a [`CoordinatorHandle`]. Ad-hoc range imports
//! are fanned out on their own task so the loop keeps serving
//! registrations while they run.

use crate::gate::ConcurrencyGate;
use crate::importer::{ImportContext, PrometheusImporter, RunResult};
use crate::reconcile::{reconcile, Reconcile};
use crate::worker::WorkerHandle;
use chrono::{DateTime, Utc};
use metering_core::{DataSourceSpec, Error, ImportDefaults, ResolvedSource, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use telemetry::metrics;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const COMMAND_BUFFER: usize = 64;

/// Outcome of an ad-hoc import for one data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub data_source: String,
    pub windows: usize,
    pub metrics_imported: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Prometheus,
    Disabled,
    AwsBilling,
}

/// A registered data source as seen from outside the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSourceStatus {
    pub name: String,
    pub kind: SourceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,
    pub last_timestamp: Option<DateTime<Utc>>,
}

enum Command {
    Upsert {
        spec: DataSourceSpec,
        reply: oneshot::Sender<Result<()>>,
    },
    Remove {
        name: String,
        reply: oneshot::Sender<bool>,
    },
    Trigger {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        reply: oneshot::Sender<Result<Vec<ImportResult>>>,
    },
    List {
        reply: oneshot::Sender<Vec<Listing>>,
    },
}

struct Listing {
    name: String,
    kind: SourceKind,
    importer: Option<(Arc<PrometheusImporter>, std::time::Duration)>,
}

/// Cheap, cloneable access to a running coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Command>,
}

impl CoordinatorHandle {
    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| Error::CoordinatorUnavailable)?;
        rx.await.map_err(|_| Error::CoordinatorUnavailable)
    }

    /// Register a data source or apply a changed spec to a registered one.
    pub async fn upsert_data_source(&self, spec: DataSourceSpec) -> Result<()> {
        self.request(|reply| Command::Upsert { spec, reply }).await?
    }

    /// Forget a data source, stopping its worker. Returns whether it existed.
    pub async fn remove_data_source(&self, name: &str) -> Result<bool> {
        let name = name.to_string();
        self.request(|reply| Command::Remove { name, reply }).await
    }

    /// Import `[start, end)` for every registered importer and wait for all
    /// of them. Fails with the first per-source error.
    pub async fn trigger_import(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ImportResult>> {
        if start >= end {
            return Err(Error::config("start time must be before end time"));
        }
        self.request(|reply| Command::Trigger { start, end, reply })
            .await?
    }

    /// Every registered data source, in name order.
    pub async fn data_sources(&self) -> Result<Vec<DataSourceStatus>> {
        let listings = self.request(|reply| Command::List { reply }).await?;

        let mut statuses = Vec::with_capacity(listings.len());
        for listing in listings {
            let mut status = DataSourceStatus {
                name: listing.name,
                kind: listing.kind,
                table: None,
                interval_secs: None,
                last_timestamp: None,
            };
            if let Some((importer, interval)) = listing.importer {
                status.table = Some(importer.config().await.table);
                status.interval_secs = Some(interval.as_secs());
                status.last_timestamp = importer.last_timestamp().await;
            }
            statuses.push(status);
        }
        Ok(statuses)
    }
}

struct Entry {
    resolved: ResolvedSource,
    worker: Option<WorkerHandle>,
}

/// Owns the worker map. Constructed and driven by [`Coordinator::spawn`].
pub struct Coordinator {
    ctx: ImportContext,
    defaults: ImportDefaults,
    gate: ConcurrencyGate,
    cancel: CancellationToken,
    sources: BTreeMap<String, Entry>,
    triggers: JoinSet<()>,
}

impl Coordinator {
    /// Start the event loop. It runs until `cancel` fires, then stops every
    /// worker and waits for in-flight ad-hoc imports before the returned
    /// task completes.
    pub fn spawn(
        ctx: ImportContext,
        defaults: ImportDefaults,
        gate: ConcurrencyGate,
        cancel: CancellationToken,
    ) -> (CoordinatorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let coordinator = Self {
            ctx,
            defaults,
            gate,
            cancel: cancel.child_token(),
            sources: BTreeMap::new(),
            triggers: JoinSet::new(),
        };
        let task = tokio::spawn(coordinator.run(rx));
        (CoordinatorHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        info!(gate_capacity = self.gate.capacity(), "Coordinator started");

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some(_) = self.triggers.join_next(), if !self.triggers.is_empty() => {}
                command = rx.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
            }
        }

        self.shutdown().await;
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Upsert { spec, reply } => {
                let name = spec.name.clone();
                let result = self.upsert(spec).await;
                if let Err(e) = &result {
                    warn!(data_source = %name, error = %e, "Rejected data source");
                }
                let _ = reply.send(result);
            }
            Command::Remove { name, reply } => {
                let _ = reply.send(self.remove(&name).await);
            }
            Command::Trigger { start, end, reply } => self.trigger(start, end, reply),
            Command::List { reply } => {
                let listings = self
                    .sources
                    .iter()
                    .map(|(name, entry)| Listing {
                        name: name.clone(),
                        kind: kind_of(&entry.resolved),
                        importer: entry
                            .worker
                            .as_ref()
                            .map(|w| (w.importer().clone(), w.interval())),
                    })
                    .collect();
                let _ = reply.send(listings);
            }
        }
    }

    async fn upsert(&mut self, spec: DataSourceSpec) -> Result<()> {
        let resolved = spec.resolve(&self.defaults)?;
        let name = spec.name;

        let entry = self.sources.entry(name.clone()).or_insert(Entry {
            resolved: ResolvedSource::Disabled,
            worker: None,
        });

        // The running import, not the last spec, is what the worker reflects.
        let current = entry
            .resolved
            .import()
            .filter(|_| entry.worker.is_some())
            .cloned();

        match reconcile(current.as_ref(), resolved.import()) {
            Reconcile::Noop => {
                debug!(data_source = %name, "Data source unchanged");
            }
            Reconcile::Start(import) => {
                let importer = Arc::new(PrometheusImporter::new(
                    name.clone(),
                    import.config,
                    self.ctx.clone(),
                ));
                entry.worker = Some(WorkerHandle::spawn(
                    importer,
                    self.gate.clone(),
                    import.interval,
                    &self.cancel,
                ));
                info!(data_source = %name, "Data source registered");
            }
            Reconcile::Update(config) => {
                if let Some(worker) = &entry.worker {
                    worker.importer().update_config(config).await;
                }
            }
            Reconcile::Restart { config, interval } => {
                if let Some(old) = entry.worker.take() {
                    let importer = old.importer().clone();
                    old.stop().await;
                    importer.update_config(config).await;
                    entry.worker = Some(WorkerHandle::spawn(
                        importer,
                        self.gate.clone(),
                        interval,
                        &self.cancel,
                    ));
                    info!(
                        data_source = %name,
                        interval_secs = interval.as_secs(),
                        "Worker restarted with new interval"
                    );
                }
            }
            Reconcile::Stop => {
                if let Some(old) = entry.worker.take() {
                    old.stop().await;
                }
                info!(data_source = %name, "Data source no longer imported");
            }
        }

        entry.resolved = resolved;
        self.update_worker_gauge();
        Ok(())
    }

    async fn remove(&mut self, name: &str) -> bool {
        let Some(entry) = self.sources.remove(name) else {
            return false;
        };
        if let Some(worker) = entry.worker {
            worker.stop().await;
        }
        metrics().remove_data_source(name);
        self.update_worker_gauge();
        info!(data_source = %name, "Data source removed");
        true
    }

    fn trigger(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        reply: oneshot::Sender<Result<Vec<ImportResult>>>,
    ) {
        let importers: Vec<_> = self
            .sources
            .values()
            .filter_map(|entry| entry.worker.as_ref())
            .map(|worker| worker.importer().clone())
            .collect();

        metrics().adhoc_imports.inc();
        info!(
            start = %start,
            end = %end,
            data_sources = importers.len(),
            "Ad-hoc import requested"
        );

        let gate = self.gate.clone();
        let cancel = self.cancel.clone();
        self.triggers.spawn(async move {
            let result = fan_out(importers, gate, cancel, start, end).await;
            let _ = reply.send(result);
        });
    }

    fn update_worker_gauge(&self) {
        let running = self.sources.values().filter(|e| e.worker.is_some()).count();
        metrics().active_workers.set(running as u64);
    }

    async fn shutdown(mut self) {
        info!(workers = self.sources.len(), "Coordinator stopping");
        self.cancel.cancel();

        for (_, entry) in std::mem::take(&mut self.sources) {
            if let Some(worker) = entry.worker {
                worker.stop().await;
            }
        }
        while let Some(joined) = self.triggers.join_next().await {
            if let Err(e) = joined {
                error!("Ad-hoc import task failed: {}", e);
            }
        }

        metrics().active_workers.set(0);
        info!("Coordinator stopped");
    }
}

async fn fan_out(
    importers: Vec<Arc<PrometheusImporter>>,
    gate: ConcurrencyGate,
    cancel: CancellationToken,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<ImportResult>> {
    let mut runs = JoinSet::new();
    for (index, importer) in importers.into_iter().enumerate() {
        let gate = gate.clone();
        let cancel = cancel.clone();
        runs.spawn(async move {
            let result: RunResult = match gate.acquire(&cancel).await {
                Ok(_permit) => importer.import_range(&cancel, start, end, true).await,
                Err(e) => Err(crate::importer::ImportError {
                    windows_processed: 0,
                    source: e,
                }),
            };
            (index, importer.name().to_string(), result)
        });
    }

    let mut outcomes = Vec::with_capacity(runs.len());
    while let Some(joined) = runs.join_next().await {
        let outcome = joined.map_err(|e| Error::internal(format!("ad-hoc import task: {}", e)))?;
        outcomes.push(outcome);
    }
    outcomes.sort_by_key(|(index, _, _)| *index);

    let mut results = Vec::with_capacity(outcomes.len());
    for (_, name, result) in outcomes {
        match result {
            Ok(summary) => results.push(ImportResult {
                data_source: name,
                windows: summary.windows,
                metrics_imported: summary.metrics_imported,
            }),
            Err(e) => return Err(Error::for_data_source(name, e.into_inner())),
        }
    }
    Ok(results)
}

fn kind_of(resolved: &ResolvedSource) -> SourceKind {
    match resolved {
        ResolvedSource::Prometheus(_) => SourceKind::Prometheus,
        ResolvedSource::Disabled => SourceKind::Disabled,
        ResolvedSource::AwsBilling => SourceKind::AwsBilling,
    }
}
