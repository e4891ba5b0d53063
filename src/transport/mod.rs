//! Transport layer for broker communication
//!
//! This module provides the narrow transport capability used by the message
//! router, the MQTT implementation behind it, and the reconnection building
//! blocks (backoff schedule and subscription registry).

use std::sync::Arc;
use std::time::Duration;

pub mod backoff;
pub mod mqtt;
pub mod subscriptions;

pub use backoff::BackoffPolicy;
pub use subscriptions::SubscriptionRegistry;

/// Handler invoked for every inbound message as `(topic, payload)`.
///
/// Invocations never overlap; the handler runs on the task that owns the
/// network session and must not block for long.
pub type MessageCallback = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Transport capability
///
/// This trait abstracts the broker session so the router can be exercised
/// against an in-memory double. None of the operations report failures to the
/// caller: network errors are logged and reflected in the connection flags.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Start connecting in the background. No-op while connecting, connected
    /// or after shutdown.
    fn connect(&self);

    /// Stop reconnecting and close the session, waiting at most
    /// `drain_timeout` for in-flight packets. Safe to call more than once.
    async fn disconnect(&self, drain_timeout: Duration);

    /// Register a topic filter; sent to the broker now if connected, otherwise
    /// on the next successful connect.
    fn subscribe(&self, topic: &str);

    /// Remove a topic filter from the registry and the broker.
    fn unsubscribe(&self, topic: &str);

    /// Fire-and-forget publish at QoS 1, not retained. Dropped while disconnected.
    fn publish(&self, topic: &str, payload: Vec<u8>);

    /// Replace the inbound message handler; `None` clears it.
    fn set_message_callback(&self, callback: Option<MessageCallback>);

    /// Check if transport is currently connected
    fn is_connected(&self) -> bool;

    /// Check if at least one subscription is confirmed on the current session
    fn is_subscribed(&self) -> bool;
}

pub use mqtt::MqttTransport;
