//! The seam between importers and the query engine.

use crate::client::ClickHouseClient;
use crate::query::last_timestamp;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metering_core::{Error, Result};

/// Storage operations an importer needs.
///
/// Implementations must be safe to call concurrently.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Execute a statement that returns no rows.
    async fn execute(&self, sql: &str) -> Result<()>;

    /// Newest persisted sample time in `table`, `None` when it holds no rows.
    async fn last_timestamp(&self, table: &str) -> Result<Option<DateTime<Utc>>>;
}

#[async_trait]
impl MetricStore for ClickHouseClient {
    async fn execute(&self, sql: &str) -> Result<()> {
        self.inner()
            .query(sql)
            .execute()
            .await
            .map_err(|e| Error::storage(format!("Statement failed: {}", e)))
    }

    async fn last_timestamp(&self, table: &str) -> Result<Option<DateTime<Utc>>> {
        last_timestamp(self, table).await
    }
}
