//! Observability: structured logging and HTTP health probes

pub mod health;
pub mod logging;

// Re-export for convenience
pub use health::{handle_healthz, handle_readyz, run_healthcheck, HealthServer, ReadinessSource};
pub use logging::{init_logging, parse_level, LogFormat};

// Span macros for structured logging
pub use logging::{message_span, mqtt_span};
