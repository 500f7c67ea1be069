//! ClickHouse client for the metering importer.

pub mod client;
pub mod config;
pub mod health;
pub mod insert;
pub mod query;
pub mod schema;
pub mod store;

pub use client::*;
pub use config::*;
pub use insert::{BatchWriter, WriteStats, DEFAULT_MAX_STATEMENT_BYTES};
pub use query::*;
pub use store::*;
