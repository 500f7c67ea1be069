//! Metrics backend health checks.

use crate::client::PrometheusClient;
use tracing::{debug, error};

/// Check that the backend answers an instant query.
pub async fn check_connection(client: &PrometheusClient) -> bool {
    let url = match client.endpoint("api/v1/query") {
        Ok(url) => url,
        Err(e) => {
            error!("Metrics backend health check failed: {}", e);
            return false;
        }
    };

    match client.request(url).query(&[("query", "1")]).send().await {
        Ok(resp) if resp.status().is_success() => {
            debug!("Metrics backend connection healthy");
            true
        }
        Ok(resp) => {
            error!(status = %resp.status(), "Metrics backend health check failed");
            false
        }
        Err(e) => {
            error!("Metrics backend health check failed: {}", e);
            false
        }
    }
}
