//! Import workers for the metering importer.
//!
//! - Importer (cursor-driven and explicit-range runs for one data source)
//! - Gate (process-wide cap on concurrent runs)
//! - Worker (periodic ticker per data source)
//! - Coordinator (owns the worker map, fans out ad-hoc imports)

pub mod coordinator;
pub mod gate;
pub mod importer;
pub mod reconcile;
pub mod worker;


pub use coordinator::{Coordinator, CoordinatorHandle, DataSourceStatus, ImportResult, SourceKind};
pub use gate::{ConcurrencyGate, GatePermit};
pub use importer::{ImportContext, ImportError, ImportSummary, PrometheusImporter, RunResult};
pub use reconcile::Reconcile;
pub use worker::WorkerHandle;
