//! Deciding what to do with a worker when its data source changes.

use metering_core::{ImporterConfig, PrometheusImport};
use std::time::Duration;

/// Action needed to bring a data source's worker in line with its spec.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconcile {
    /// Nothing changed.
    Noop,
    /// No worker yet; start one.
    Start(PrometheusImport),
    /// Same cadence, new settings. Applied between runs.
    Update(ImporterConfig),
    /// Cadence changed; the worker must be respawned. The importer and its
    /// cursor are kept.
    Restart {
        config: ImporterConfig,
        interval: Duration,
    },
    /// Source no longer needs a worker.
    Stop,
}

/// Compare the running import (if any) with the desired one.
pub fn reconcile(
    current: Option<&PrometheusImport>,
    desired: Option<&PrometheusImport>,
) -> Reconcile {
    match (current, desired) {
        (None, None) => Reconcile::Noop,
        (None, Some(desired)) => Reconcile::Start(desired.clone()),
        (Some(_), None) => Reconcile::Stop,
        (Some(current), Some(desired)) if current == desired => Reconcile::Noop,
        (Some(current), Some(desired)) if current.interval == desired.interval => {
            Reconcile::Update(desired.config.clone())
        }
        (Some(_), Some(desired)) => Reconcile::Restart {
            config: desired.config.clone(),
            interval: desired.interval,
        },
    }
}
