//! Unified error types for the metering importer.
//!
//! Error codes:
//! - IMPORT_001-005: failures while importing a window
//! - CONFIG_001-002: rejected data source or process configuration
//! - COORD_001: coordinator no longer accepting commands
//! - INTERNAL_001: everything else

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Stable error codes exposed over the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// IMPORT_001: metrics backend query failed
    BackendFailed,
    /// IMPORT_002: backend answered with something other than a matrix
    UnexpectedResult,
    /// IMPORT_003: storage statement failed
    StoreFailed,
    /// IMPORT_004: a single record does not fit in one statement
    RecordTooLarge,
    /// IMPORT_005: import cancelled by the caller
    Cancelled,
    /// CONFIG_001: data source rejected
    InvalidDataSource,
    /// CONFIG_002: invalid request or process configuration
    InvalidConfig,
    /// COORD_001: coordinator unavailable
    CoordinatorUnavailable,
    /// INTERNAL_001: internal error
    Internal,
}

impl ErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BackendFailed => "IMPORT_001",
            Self::UnexpectedResult => "IMPORT_002",
            Self::StoreFailed => "IMPORT_003",
            Self::RecordTooLarge => "IMPORT_004",
            Self::Cancelled => "IMPORT_005",
            Self::InvalidDataSource => "CONFIG_001",
            Self::InvalidConfig => "CONFIG_002",
            Self::CoordinatorUnavailable => "COORD_001",
            Self::Internal => "INTERNAL_001",
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::BackendFailed | Self::UnexpectedResult | Self::StoreFailed => 502,
            Self::RecordTooLarge => 500,
            Self::Cancelled => 503,
            Self::InvalidDataSource | Self::InvalidConfig => 400,
            Self::CoordinatorUnavailable => 503,
            Self::Internal => 500,
        }
    }
}

/// Unified error type for the metering importer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("backend query failed: {0}")]
    Backend(String),

    #[error("unexpected query result: {0}")]
    UnexpectedResult(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("record of {size} bytes would exceed buffer size of {capacity} bytes")]
    RecordTooLarge { size: usize, capacity: usize },

    #[error("import cancelled")]
    Cancelled,

    #[error("invalid data source: {0}")]
    InvalidDataSource(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("data source {name}: {source}")]
    DataSource { name: String, source: Box<Error> },

    #[error("coordinator is not running")]
    CoordinatorUnavailable,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn unexpected_result(msg: impl Into<String>) -> Self {
        Self::UnexpectedResult(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn invalid_data_source(msg: impl Into<String>) -> Self {
        Self::InvalidDataSource(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Wrap an error with the data source it came from.
    pub fn for_data_source(name: impl Into<String>, source: Error) -> Self {
        Self::DataSource {
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// True when the error (or the error it wraps) is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::DataSource { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Get the coded classification of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Backend(_) => ErrorCode::BackendFailed,
            Self::UnexpectedResult(_) => ErrorCode::UnexpectedResult,
            Self::Storage(_) => ErrorCode::StoreFailed,
            Self::RecordTooLarge { .. } => ErrorCode::RecordTooLarge,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::InvalidDataSource(_) => ErrorCode::InvalidDataSource,
            Self::Config(_) | Self::Serialization(_) => ErrorCode::InvalidConfig,
            Self::DataSource { source, .. } => source.code(),
            Self::CoordinatorUnavailable => ErrorCode::CoordinatorUnavailable,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Get the HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        self.code().http_status()
    }

    /// Get the error code string.
    pub fn error_code(&self) -> &'static str {
        self.code().code()
    }
}
