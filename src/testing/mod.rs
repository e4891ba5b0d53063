//! Testing utilities and mock implementations
//!
//! In-memory doubles for exercising the router and probes without an MQTT
//! broker.

pub mod mocks;

pub use mocks::*;
