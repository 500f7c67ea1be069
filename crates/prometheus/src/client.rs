//! HTTP range-query client.

use crate::backend::MetricsBackend;
use crate::config::PrometheusConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metering_core::{Error, Matrix, Result, SamplePair, SampleStream, TimeWindow};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// Range-query client speaking the Prometheus HTTP API.
#[derive(Clone)]
pub struct PrometheusClient {
    http: reqwest::Client,
    base_url: Url,
    config: PrometheusConfig,
}

impl PrometheusClient {
    /// Creates a new client.
    pub fn new(config: PrometheusConfig) -> Result<Self> {
        // Relative joins replace the last path segment unless it ends in '/'.
        let base = if config.url.ends_with('/') {
            config.url.clone()
        } else {
            format!("{}/", config.url)
        };
        let base_url = Url::parse(&base).map_err(|e| {
            Error::config(format!("invalid metrics backend url {}: {}", config.url, e))
        })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::internal(format!("Failed to create HTTP client: {}", e)))?;

        info!(url = %config.url, "Created metrics backend client");

        Ok(Self {
            http,
            base_url,
            config,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PrometheusConfig {
        &self.config
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::config(format!("invalid endpoint {}: {}", path, e)))
    }

    pub(crate) fn request(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self.http.get(url);
        match self.config.bearer_token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl MetricsBackend for PrometheusClient {
    async fn query_range(&self, query: &str, window: &TimeWindow) -> Result<Matrix> {
        let url = self.endpoint("api/v1/query_range")?;
        let start = Instant::now();

        let response = self
            .request(url)
            .query(&[
                ("query", query.to_string()),
                ("start", window.start.timestamp().to_string()),
                ("end", window.end.timestamp().to_string()),
                ("step", format!("{}s", window.step.num_seconds())),
            ])
            .send()
            .await
            .map_err(|e| Error::backend(format!("range query request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::backend(format!("failed to read range query response: {}", e)))?;

        if !status.is_success() && !body.trim_start().starts_with('{') {
            warn!(status = %status, "Range query returned error status");
            return Err(Error::backend(format!("range query returned {}: {}", status, body)));
        }

        let matrix = decode_matrix(&body)?;

        debug!(
            window = %window,
            series = matrix.len(),
            latency_ms = %start.elapsed().as_millis(),
            "Range query complete"
        );

        Ok(matrix)
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(rename = "resultType")]
    result_type: String,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WireSeries {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    #[serde(default)]
    values: Vec<(f64, String)>,
}

/// Decode a range-query response body into a matrix.
///
/// Anything other than a successful matrix result is an error.
pub fn decode_matrix(body: &str) -> Result<Matrix> {
    let response: ApiResponse = serde_json::from_str(body)
        .map_err(|e| Error::backend(format!("malformed range query response: {}", e)))?;

    if response.status != "success" {
        return Err(Error::backend(format!(
            "{}: {}",
            response.error_type.as_deref().unwrap_or("error"),
            response.error.as_deref().unwrap_or("range query failed")
        )));
    }

    let data = response
        .data
        .ok_or_else(|| Error::unexpected_result("range query response has no data"))?;

    if data.result_type != "matrix" {
        return Err(Error::unexpected_result(format!(
            "expected a matrix in response to query, got a {}",
            data.result_type
        )));
    }

    let series: Vec<WireSeries> = serde_json::from_value(data.result)
        .map_err(|e| Error::unexpected_result(format!("malformed matrix: {}", e)))?;

    series
        .into_iter()
        .map(|s| {
            let values = s
                .values
                .into_iter()
                .map(|(ts, raw)| {
                    Ok(SamplePair {
                        timestamp: sample_time(ts)?,
                        value: parse_sample_value(&raw)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(SampleStream {
                metric: s.metric,
                values,
            })
        })
        .collect()
}

fn sample_time(ts: f64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis((ts * 1000.0).round() as i64)
        .ok_or_else(|| Error::unexpected_result(format!("sample timestamp out of range: {}", ts)))
}

fn parse_sample_value(raw: &str) -> Result<f64> {
    match raw {
        "NaN" => Ok(f64::NAN),
        "+Inf" | "Inf" => Ok(f64::INFINITY),
        "-Inf" => Ok(f64::NEG_INFINITY),
        _ => raw
            .parse::<f64>()
            .map_err(|e| Error::unexpected_result(format!("invalid sample value {:?}: {}", raw, e))),
    }
}
