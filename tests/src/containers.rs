//! ClickHouse for the end-to-end tests.
//!
//! Opt-in through `METERING_TEST_CLICKHOUSE`: `docker` starts a
//! testcontainer, any other value is taken as the URL of a running server.
//! Unset means the end-to-end tests skip themselves.

use std::time::Duration;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};

const TEST_DATABASE: &str = "metering";
const DEFAULT_IMAGE_TAG: &str = "24.3";
const HTTP_PORT: u16 = 8123;

/// Where the tests should connect, plus the container keeping it alive.
pub struct TestContainers {
    _clickhouse: Option<ContainerAsync<GenericImage>>,
    pub clickhouse_url: String,
    pub clickhouse_database: String,
    pub clickhouse_username: Option<String>,
    pub clickhouse_password: Option<String>,
}

impl TestContainers {
    pub async fn start() -> Option<Self> {
        let target = env("METERING_TEST_CLICKHOUSE")?;

        if target != "docker" {
            return Some(Self {
                _clickhouse: None,
                clickhouse_url: target,
                clickhouse_database: env("METERING_TEST_CLICKHOUSE_DB")
                    .unwrap_or_else(|| TEST_DATABASE.to_string()),
                clickhouse_username: env("METERING_TEST_CLICKHOUSE_USER"),
                clickhouse_password: env("METERING_TEST_CLICKHOUSE_PASSWORD"),
            });
        }

        let tag = env("METERING_TEST_CLICKHOUSE_IMAGE_TAG")
            .unwrap_or_else(|| DEFAULT_IMAGE_TAG.to_string());
        let (container, url) = start_clickhouse(&tag).await;

        Some(Self {
            _clickhouse: Some(container),
            clickhouse_url: url,
            clickhouse_database: TEST_DATABASE.to_string(),
            clickhouse_username: Some("default".to_string()),
            clickhouse_password: None,
        })
    }
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Start a ClickHouse server with the test database created.
async fn start_clickhouse(tag: &str) -> (ContainerAsync<GenericImage>, String) {
    let container = GenericImage::new("clickhouse/clickhouse-server", tag)
        .with_wait_for(WaitFor::message_on_stderr("Ready for connections"))
        .with_exposed_port(HTTP_PORT.tcp())
        .with_env_var("CLICKHOUSE_DB", TEST_DATABASE)
        .with_env_var("CLICKHOUSE_DEFAULT_ACCESS_MANAGEMENT", "1")
        .with_env_var("CLICKHOUSE_USER", "default")
        .with_env_var("CLICKHOUSE_PASSWORD", "")
        .start()
        .await
        .expect("Failed to start ClickHouse container");

    let port = container
        .get_host_port_ipv4(HTTP_PORT)
        .await
        .expect("ClickHouse HTTP port not mapped");
    let url = format!("http://127.0.0.1:{}", port);

    wait_for_ping(&url, Duration::from_secs(30)).await;
    (container, url)
}

/// Poll `/ping` until the server answers `Ok.`.
async fn wait_for_ping(url: &str, timeout: Duration) {
    let client = reqwest::Client::new();
    let deadline = tokio::time::Instant::now() + timeout;

    while tokio::time::Instant::now() < deadline {
        if let Ok(resp) = client.get(format!("{}/ping", url)).send().await {
            if resp.text().await.is_ok_and(|body| body.trim() == "Ok.") {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("ClickHouse at {} not ready after {:?}", url, timeout);
}
