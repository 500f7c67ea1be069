//! Periodic import worker: one per enabled data source.

use crate::gate::ConcurrencyGate;
use crate::importer::PrometheusImporter;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A running worker. Dropping the handle does not stop it; call [`stop`].
///
/// [`stop`]: WorkerHandle::stop
pub struct WorkerHandle {
    importer: Arc<PrometheusImporter>,
    interval: Duration,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Start ticking every `period`. The first run happens immediately.
    /// The worker also stops when `parent` is cancelled.
    pub fn spawn(
        importer: Arc<PrometheusImporter>,
        gate: ConcurrencyGate,
        period: Duration,
        parent: &CancellationToken,
    ) -> Self {
        let stop = parent.child_token();
        let task = tokio::spawn(run(importer.clone(), gate, period, stop.clone()));
        info!(
            data_source = %importer.name(),
            interval_secs = period.as_secs(),
            "Import worker started"
        );
        Self {
            importer,
            interval: period,
            stop,
            task,
        }
    }

    pub fn importer(&self) -> &Arc<PrometheusImporter> {
        &self.importer
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Signal the worker and wait for its current run to unwind.
    pub async fn stop(self) {
        self.stop.cancel();
        if let Err(e) = self.task.await {
            error!(data_source = %self.importer.name(), "Import worker panicked: {}", e);
        }
        info!(data_source = %self.importer.name(), "Import worker stopped");
    }
}

async fn run(
    importer: Arc<PrometheusImporter>,
    gate: ConcurrencyGate,
    period: Duration,
    stop: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let _permit = match gate.acquire(&stop).await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        debug!(data_source = %importer.name(), "Periodic import starting");
        match importer.import_from_cursor(&stop, false).await {
            Ok(_) => {}
            Err(e) if e.source.is_cancelled() => return,
            // Already logged by the importer; the next tick retries.
            Err(e) => debug!(data_source = %importer.name(), error = %e, "Periodic import failed"),
        }
    }
}
