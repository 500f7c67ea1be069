//! Data source listing and the ad-hoc collect trigger.

use axum::{body::Bytes, extract::State, Json};
use std::time::Instant;
use tracing::{error, info};

use crate::response::{ApiError, CollectRequest, CollectResponse, DataSourcesResponse};
use crate::state::AppState;

/// GET /api/v1/datasources - Registered data sources and their cursors.
pub async fn list_handler(
    State(state): State<AppState>,
) -> Result<Json<DataSourcesResponse>, ApiError> {
    let data_sources = state.coordinator.data_sources().await?;
    Ok(Json(DataSourcesResponse { data_sources }))
}

/// POST /api/v1/datasources/prometheus/collect - Import an explicit range
/// for every data source and wait for the outcome.
pub async fn collect_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CollectResponse>, ApiError> {
    let request: CollectRequest = serde_json::from_slice(&body).map_err(|e| {
        error!("Failed to parse collect request: {}", e);
        ApiError::bad_request(format!("invalid collect request: {}", e))
    })?;

    let start = Instant::now();
    let results = state
        .coordinator
        .trigger_import(request.start_time, request.end_time)
        .await
        .map_err(|e| {
            error!(
                start = %request.start_time,
                end = %request.end_time,
                error = %e,
                "Ad-hoc collect failed"
            );
            ApiError::from(e)
        })?;

    info!(
        start = %request.start_time,
        end = %request.end_time,
        data_sources = results.len(),
        latency_ms = %start.elapsed().as_millis(),
        "Ad-hoc collect complete"
    );

    Ok(Json(CollectResponse { results }))
}
