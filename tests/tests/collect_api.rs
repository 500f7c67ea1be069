//! Tests for the data source endpoints and the ad-hoc collect trigger.
//!
//! These go through the full Axum router with all layers, backed by a real
//! coordinator over mock I/O.

use axum::http::StatusCode;
use axum_test::TestServer;
use integration_tests::fixtures::{
    at, aws_billing_source, collect_body, disabled_source, prometheus_source,
};
use integration_tests::setup::{ContextOptions, TestContext};
use serde_json::json;

/// POST collect imports the range for every enabled source.
#[tokio::test]
async fn test_collect_returns_per_source_results() {
    let ctx = TestContext::with_options(ContextOptions::wide_range()).await;
    ctx.register([
        prometheus_source("pod-request-cpu"),
        prometheus_source("pod-request-memory"),
        disabled_source("node-capacity"),
    ])
    .await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server
        .post("/api/v1/datasources/prometheus/collect")
        .json(&collect_body(at(10, 0), at(10, 30)))
        .await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    let results = body["results"].as_array().expect("results array");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["dataSource"], "pod-request-cpu");
    assert_eq!(results[1]["dataSource"], "pod-request-memory");
    for result in results {
        assert_eq!(result["windows"], 5);
        assert_eq!(result["metricsImported"], 60);
    }

    let rows = ctx.store.rows_for("datasource_pod_request_cpu");
    assert!(rows.iter().any(|r| r.contains("'2019-01-01 10:00:00.000'")));
}

/// Malformed bodies are rejected before reaching the coordinator.
#[tokio::test]
async fn test_collect_rejects_invalid_body() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server
        .post("/api/v1/datasources/prometheus/collect")
        .json(&json!({ "startTime": "yesterday" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "CONFIG_002");
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("invalid collect request"));
    assert_eq!(ctx.backend.call_count(), 0);
}

/// An empty or inverted range is a client error.
#[tokio::test]
async fn test_collect_rejects_inverted_range() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    for (start, end) in [(at(11, 0), at(10, 0)), (at(10, 0), at(10, 0))] {
        let response = server
            .post("/api/v1/datasources/prometheus/collect")
            .json(&collect_body(start, end))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let body: serde_json::Value = response.json();
        assert_eq!(body["code"], "CONFIG_002");
    }
}

/// A failing source turns the whole collect into a gateway error naming it.
#[tokio::test]
async fn test_collect_reports_failing_source() {
    let ctx = TestContext::new().await;
    ctx.register([prometheus_source("pod-request-cpu"), prometheus_source("flaky")])
        .await;
    ctx.backend.fail_queries_containing("\"flaky\"");
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server
        .post("/api/v1/datasources/prometheus/collect")
        .json(&collect_body(at(10, 0), at(10, 30)))
        .await;
    response.assert_status(StatusCode::BAD_GATEWAY);

    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "IMPORT_001");
    assert!(body["error"].as_str().unwrap().contains("flaky"));
}

/// GET lists every registered source in name order.
#[tokio::test]
async fn test_list_data_sources() {
    let ctx = TestContext::new().await;
    ctx.register([
        prometheus_source("pod-request-cpu"),
        aws_billing_source("aws-billing"),
        disabled_source("node-capacity"),
    ])
    .await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server.get("/api/v1/datasources").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    let sources = body["dataSources"].as_array().expect("dataSources array");
    let names: Vec<_> = sources.iter().map(|s| s["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["aws-billing", "node-capacity", "pod-request-cpu"]);

    assert_eq!(sources[0]["kind"], "aws_billing");
    assert!(sources[0].get("table").is_none());
    assert_eq!(sources[1]["kind"], "disabled");
    assert_eq!(sources[2]["kind"], "prometheus");
    assert_eq!(sources[2]["table"], "datasource_pod_request_cpu");
    assert_eq!(sources[2]["interval_secs"], 300);
}

/// GET /metrics exposes the process counters as JSON.
#[tokio::test]
async fn test_metrics_endpoint() {
    let ctx = TestContext::new().await;
    ctx.register([prometheus_source("node-usage")]).await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    server
        .post("/api/v1/datasources/prometheus/collect")
        .json(&collect_body(at(10, 0), at(10, 5)))
        .await
        .assert_status_ok();

    let response = server.get("/metrics").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert!(body["adhoc_imports"].as_u64().unwrap() >= 1);
    assert!(body["statements_executed"].as_u64().unwrap() >= 1);

    let source = body["data_sources"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["name"] == "node-usage")
        .expect("per-source metrics");
    assert!(source["metrics_imported"].as_u64().unwrap() >= 12);
    assert_eq!(source["imports_failed"], 0);
}
