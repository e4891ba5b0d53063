//! MQTT transport with automatic reconnection
//!
//! The implementation separates pure decisions from I/O:
//!
//! - [`connection`] - Connection state, errors and broker option mapping
//! - [`message_handler`] - Pure routing of rumqttc events
//! - [`health_monitor`] - Pure state machine and transition logging
//! - [`client`] - The session task and public transport operations
//! - [`reconnect`] - The backoff-driven reconnect worker
//!
//! # Usage
//!
//! ```rust,no_run
//! use scene_tracker::config::MqttSection;
//! use scene_tracker::transport::{MqttTransport, Transport};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let config = MqttSection {
//!     host: "localhost".to_string(),
//!     port: 1883,
//!     insecure: true,
//!     tls: None,
//! };
//!
//! let transport = MqttTransport::new(&config)?;
//! transport.connect();
//! transport.subscribe("scenescape/data/camera/+");
//! transport.disconnect(Duration::from_secs(2)).await;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod health_monitor;
pub mod message_handler;
mod reconnect;

// Re-export public types for convenience
pub use client::{MqttTransport, SessionClient, TransportStats};
pub use connection::{generate_client_id, ConnectionState, MqttError};
pub use health_monitor::{ConnectionEvent, HealthMonitor};
pub use message_handler::{EventRoute, MessageHandler};
