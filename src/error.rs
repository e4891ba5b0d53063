//! Top-level error type for service startup
//!
//! Runtime failures in the message and reconnect paths are logged where they
//! happen and never surface here. Only errors that prevent the service from
//! starting are propagated to `main`.

use thiserror::Error;

/// Errors that abort service startup
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("MQTT error: {0}")]
    Mqtt(#[from] crate::transport::mqtt::MqttError),

    #[error("Healthcheck server error: {0}")]
    HealthServer(#[from] warp::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for startup operations
pub type TrackerResult<T> = Result<T, TrackerError>;
