//! Tracing subscriber bootstrap.
//!
//! Installed once by the server binary. Library crates only use the
//! `tracing` macros and never touch subscriber state, so tests and
//! embedders stay free to install their own.

use tracing_subscriber::EnvFilter;

/// Output format for log lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, for interactive terminals.
    Pretty,
    /// One JSON object per line, for log shippers.
    Json,
}

/// Install the global tracing subscriber.
///
/// `filter` follows `RUST_LOG` syntax (e.g. `info,ripple_server=debug`);
/// when empty, the `RUST_LOG` env var applies with an `info` fallback.
/// Returns an error string if a subscriber is already installed.
pub fn init_tracing(format: LogFormat, filter: &str) -> Result<(), String> {
    let env_filter = if filter.is_empty() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::new(filter)
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    let result = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| e.to_string())
}
