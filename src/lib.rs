//! Scene Tracker - Rust Implementation
//!
//! A resilient MQTT bridge that consumes camera detection messages, validates
//! them against JSON schemas and republishes scene updates.
//!
//! # Overview
//!
//! This crate provides:
//! - An MQTT transport that reconnects with capped exponential backoff and
//!   re-asserts its subscriptions after every reconnect
//! - A message router that validates camera input and publishes scene output
//! - TOML configuration with `TRACKER_*` environment overrides
//! - Structured logging and HTTP liveness/readiness probes
//!
//! # Quick Start
//!
//! ```rust
//! use scene_tracker::routing::MessageRouter;
//! use scene_tracker::testing::MockTransport;
//! use std::sync::Arc;
//!
//! let transport = Arc::new(MockTransport::connected());
//! let router = MessageRouter::with_validators(transport.clone(), None, None);
//! router.start();
//!
//! let camera = r#"{"id":"cam1","timestamp":"2026-01-27T12:00:00.000Z","objects":{}}"#;
//! transport.simulate_message("scenescape/data/camera/cam1", camera.as_bytes());
//!
//! let published = transport.published();
//! assert_eq!(published[0].0, "scenescape/data/scene/dummy-scene/thing");
//! assert_eq!(router.counters().published, 1);
//! ```

pub mod config;
pub mod error;
pub mod observability;
pub mod routing;
pub mod testing;
pub mod transport;

pub use config::{ConfigError, ServiceConfig};
pub use error::{TrackerError, TrackerResult};
pub use routing::MessageRouter;
pub use transport::{MqttTransport, Transport};
