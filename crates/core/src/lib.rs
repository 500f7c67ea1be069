//! Core types for the metering importer.
//!
//! Window planning, metric records, data source specifications and the
//! shared error type. Nothing in here performs I/O.

pub mod clock;
pub mod datasource;
pub mod error;
pub mod record;
pub mod window;

pub use clock::*;
pub use datasource::*;
pub use error::{Error, ErrorCode, Result};
pub use record::*;
pub use window::*;
