//! The seam between importers and whatever answers range queries.

use async_trait::async_trait;
use metering_core::{Matrix, Result, TimeWindow};

/// Anything that can evaluate a range query over a window.
///
/// Implementations must be safe to call concurrently; importers share one
/// backend and issue queries in parallel up to the gate capacity.
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    /// Evaluate `query` over `window`, sampling every `window.step`.
    async fn query_range(&self, query: &str, window: &TimeWindow) -> Result<Matrix>;
}
