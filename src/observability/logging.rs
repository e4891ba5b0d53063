//! Structured logging using the tracing crate
//!
//! ## Log Format Options
//!
//! - `json` - Structured JSON for production and log aggregation
//! - `pretty` - Human-readable, coloured, multi-line output for development
//! - `compact` - Coloured single-line terminal output
//!
//! Level and format come from the service configuration (`[logging]`), the
//! `TRACKER_LOG_LEVEL` override or the `--log-level` flag. `RUST_LOG`, when
//! set, replaces the computed filter entirely.
//!
//! ```bash
//! # Development with colors
//! RUST_LOG=scene_tracker=debug tracker --config config/tracker.toml
//! ```

use std::env;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Dependencies that are noisy below warn
const QUIET_TARGETS: [&str; 4] = ["rumqttc", "warp", "hyper", "tokio"];

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON format for structured logging (machine-readable)
    Json,
    /// Pretty format with colors and indentation (human-readable)
    Pretty,
    /// Compact format with colors but minimal spacing (terminal-friendly)
    Compact,
}

impl LogFormat {
    /// Parse log format from string
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Json, // Default to JSON for production
        }
    }
}

/// Map a level name to a tracing level, falling back to INFO
pub fn parse_level(s: &str) -> Level {
    match s.to_uppercase().as_str() {
        "ERROR" => Level::ERROR,
        "WARN" => Level::WARN,
        "INFO" => Level::INFO,
        "DEBUG" => Level::DEBUG,
        "TRACE" => Level::TRACE,
        _ => Level::INFO,
    }
}

/// Filter directives for `level` with dependency noise reduced
pub fn filter_directives(level: Level) -> String {
    let mut directives = level.to_string().to_lowercase();
    for target in QUIET_TARGETS {
        directives.push_str(&format!(",{target}=warn"));
    }
    directives
}

/// Install the global subscriber.
///
/// Later calls are ignored; the first subscriber stays in place.
pub fn init_logging(level: Level, format: LogFormat) {
    // Allow RUST_LOG to override
    let filter = match env::var("RUST_LOG") {
        Ok(rust_log) if !rust_log.is_empty() => EnvFilter::new(rust_log),
        _ => EnvFilter::new(filter_directives(level)),
    };

    let subscriber = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Json => subscriber
            .with(fmt::layer().json().with_current_span(true))
            .try_init(),
        LogFormat::Pretty => subscriber
            .with(fmt::layer().pretty().with_ansi(true))
            .try_init(),
        LogFormat::Compact => subscriber
            .with(fmt::layer().compact().with_ansi(true).with_target(false))
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("Global subscriber already installed");
    }
}

/// Create an MQTT operation span
#[macro_export]
macro_rules! mqtt_span {
    ($($field:tt)*) => {
        tracing::info_span!("mqtt_operation", $($field)*)
    };
}

/// Create a span around processing of one inbound message
#[macro_export]
macro_rules! message_span {
    ($($field:tt)*) => {
        tracing::debug_span!("message_processing", $($field)*)
    };
}

pub use {message_span, mqtt_span};
