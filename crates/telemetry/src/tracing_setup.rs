//! Structured logging setup.
//!
//! Import runs log one event per window at `debug` and one summary per run
//! at `info`; the default filter keeps the per-window noise out.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,tower_http=warn";

/// Output encoding for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, one line per event.
    #[default]
    Text,
    /// One JSON object per event, with source locations and thread ids.
    Json,
}

impl LogFormat {
    /// `LOG_JSON=1` or `LOG_JSON=true` selects JSON.
    pub fn from_env() -> Self {
        match std::env::var("LOG_JSON") {
            Ok(v) if v == "1" || v.eq_ignore_ascii_case("true") => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Install the global subscriber. Only the first call in a process wins.
pub fn init_tracing(filter: &str, format: LogFormat) {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|e| {
        eprintln!("invalid log filter {:?} ({}), using {}", filter, e, DEFAULT_FILTER);
        EnvFilter::new(DEFAULT_FILTER)
    });

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init(),
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).try_init(),
    };

    if installed.is_ok() {
        tracing::info!(filter = %filter, format = ?format, "Logging initialized");
    }
}

/// Initialize from `RUST_LOG` and `LOG_JSON`.
pub fn init_tracing_from_env() {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string());

    init_tracing(&filter, LogFormat::from_env());
}
