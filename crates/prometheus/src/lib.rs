//! Metrics backend access for the metering importer.

pub mod backend;
pub mod client;
pub mod config;
pub mod health;

pub use backend::*;
pub use client::*;
pub use config::*;
