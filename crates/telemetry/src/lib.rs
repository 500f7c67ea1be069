//! Internal telemetry for the metering importer.
//!
//! Structured logging setup, in-process import metrics and the health of
//! the two external dependencies (metrics backend and ClickHouse).

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
