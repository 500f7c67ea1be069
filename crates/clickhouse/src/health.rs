//! ClickHouse health checks.

use crate::client::ClickHouseClient;
use crate::schema::metric_table_ddl;
use metering_core::{validate_table_name, Error, Result};
use tracing::{debug, error};

/// Check ClickHouse connection health.
pub async fn check_connection(client: &ClickHouseClient) -> bool {
    match client.inner().query("SELECT 1").fetch_one::<u8>().await {
        Ok(_) => {
            debug!("ClickHouse connection healthy");
            true
        }
        Err(e) => {
            error!("ClickHouse health check failed: {}", e);
            false
        }
    }
}

/// Create a metric table if it does not exist yet.
pub async fn ensure_metric_table(client: &ClickHouseClient, table: &str) -> Result<()> {
    validate_table_name(table)?;

    client
        .inner()
        .query(&metric_table_ddl(table))
        .execute()
        .await
        .map_err(|e| Error::storage(format!("Failed to create table {}: {}", table, e)))?;

    debug!(table = %table, "Metric table ready");
    Ok(())
}
