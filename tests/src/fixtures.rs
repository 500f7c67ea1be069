//! Test fixtures: instants, data source specs and backend payloads.

use chrono::{DateTime, Duration, TimeZone, Utc};
use metering_core::{
    AwsBillingSpec, Backfill, DataSourceSpec, ImporterConfig, PrometheusImportSpec,
};

/// An instant on 2019-01-01 (UTC).
pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2019, 1, 1, h, m, 0).unwrap()
}

/// A range query resembling the operator's pod request queries.
pub fn pod_query(name: &str) -> String {
    format!(
        "sum(kube_pod_container_resource_requests{{resource=\"{}\"}}) by (pod, namespace, node)",
        name
    )
}

/// An enabled Prometheus data source using every default.
pub fn prometheus_source(name: &str) -> DataSourceSpec {
    DataSourceSpec {
        name: name.to_string(),
        prometheus: Some(PrometheusImportSpec {
            query: pod_query(name),
            table_name: None,
            enabled: true,
            chunk_size_secs: None,
            step_size_secs: None,
            query_interval_secs: None,
        }),
        aws_billing: None,
    }
}

/// A Prometheus data source with its own interval.
pub fn prometheus_source_every(name: &str, interval_secs: u64) -> DataSourceSpec {
    let mut spec = prometheus_source(name);
    if let Some(prom) = spec.prometheus.as_mut() {
        prom.query_interval_secs = Some(interval_secs);
    }
    spec
}

/// A Prometheus data source that is switched off.
pub fn disabled_source(name: &str) -> DataSourceSpec {
    let mut spec = prometheus_source(name);
    if let Some(prom) = spec.prometheus.as_mut() {
        prom.enabled = false;
    }
    spec
}

pub fn aws_billing_source(name: &str) -> DataSourceSpec {
    DataSourceSpec {
        name: name.to_string(),
        prometheus: None,
        aws_billing: Some(AwsBillingSpec {
            bucket: "operator-metering-billing".to_string(),
            prefix: Some("reports/".to_string()),
            region: Some("us-east-1".to_string()),
        }),
    }
}

/// Importer settings for direct importer tests.
pub fn importer_config(table: &str, chunk: Duration, max_range: Duration) -> ImporterConfig {
    ImporterConfig {
        query: pod_query("cpu"),
        table: table.to_string(),
        chunk_size: chunk,
        step_size: Duration::minutes(1),
        max_windows: (max_range.num_seconds() / chunk.num_seconds()).max(1),
        max_query_range: max_range,
        backfill: Backfill::TwoChunks,
    }
}

/// A successful range-query body with one series.
pub fn matrix_body(pod: &str, samples: &[(i64, &str)]) -> serde_json::Value {
    let values: Vec<_> = samples
        .iter()
        .map(|&(ts, v)| {
            let ts = ts as f64;
            serde_json::json!([ts, v])
        })
        .collect();
    serde_json::json!({
        "status": "success",
        "data": {
            "resultType": "matrix",
            "result": [{
                "metric": { "namespace": "default", "pod": pod },
                "values": values
            }]
        }
    })
}

/// A successful body of some other result type.
pub fn vector_body() -> serde_json::Value {
    serde_json::json!({
        "status": "success",
        "data": { "resultType": "vector", "result": [] }
    })
}

/// A backend-side error body.
pub fn error_body(error_type: &str, message: &str) -> serde_json::Value {
    serde_json::json!({
        "status": "error",
        "errorType": error_type,
        "error": message
    })
}

/// JSON body for the collect endpoint.
pub fn collect_body(start: DateTime<Utc>, end: DateTime<Utc>) -> serde_json::Value {
    serde_json::json!({
        "startTime": start.to_rfc3339(),
        "endTime": end.to_rfc3339()
    })
}
