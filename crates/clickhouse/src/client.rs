//! ClickHouse client wrapper.

use crate::config::ClickHouseConfig;
use clickhouse::Client;
use metering_core::{validate_table_name, Error, Result};
use tracing::info;
use url::Url;

/// ClickHouse client wrapper. Cheap to clone; clones share the HTTP pool.
#[derive(Clone)]
pub struct ClickHouseClient {
    inner: Client,
    config: ClickHouseConfig,
}

impl ClickHouseClient {
    /// Creates a new ClickHouse client.
    ///
    /// The server-side query size limit is raised to the statement cap so
    /// a full batch is never rejected by the parser.
    pub fn new(config: ClickHouseConfig) -> Result<Self> {
        Url::parse(&config.url)
            .map_err(|e| Error::config(format!("invalid ClickHouse url {}: {}", config.url, e)))?;
        validate_table_name(&config.database)
            .map_err(|_| Error::config(format!("invalid database name: {}", config.database)))?;

        let mut client = Client::default()
            .with_url(&config.url)
            .with_database(&config.database)
            .with_option("max_query_size", config.max_statement_bytes.to_string())
            .with_option("wait_end_of_query", "1");

        if let Some(ref user) = config.username {
            client = client.with_user(user);
        }
        if let Some(ref pass) = config.password {
            client = client.with_password(pass);
        }

        info!(
            url = %config.url,
            database = %config.database,
            max_statement_bytes = config.max_statement_bytes,
            "Created ClickHouse client"
        );

        Ok(Self {
            inner: client,
            config,
        })
    }

    pub fn inner(&self) -> &Client {
        &self.inner
    }

    pub fn config(&self) -> &ClickHouseConfig {
        &self.config
    }
}
