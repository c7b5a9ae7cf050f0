//! # Structured Logging
//!
//! Installs the `tracing` subscriber for the `cardledger` binary: an
//! `EnvFilter` (overridable through `RUST_LOG`) plus one `fmt` layer in
//! pretty or JSON form.
//!
//! Logs go to stderr. Stdout carries command output only (owners, block
//! listings, wallet paths), so it can be piped.

use std::io::IsTerminal;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default directive when `RUST_LOG` is unset. The library's catch-up and
/// append events are `info`, per-block detail is `debug`.
pub const DEFAULT_DIRECTIVE: &str = "cardledger=info,cardledger_protocol=info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, colored when stderr is a terminal.
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Accepts "json" or "pretty" (case-insensitive). Anything else is `Pretty`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Build the filter: `RUST_LOG` wins, `default_directive` otherwise.
fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Initialize the global subscriber. Call once, first thing in `main()`.
///
/// ```text
/// RUST_LOG=cardledger_protocol=debug cardledger build-indices
/// ```
pub fn init_logging(default_directive: &str, format: LogFormat) {
    let filter = env_filter(default_directive);
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(std::io::stderr().is_terminal())
                    .with_target(false)
                    .compact(),
            )
            .init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(false),
            )
            .init(),
    }

    tracing::debug!(?format, "logging initialized");
}
