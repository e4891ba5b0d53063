//! Mock implementations for testing
//!
//! Provides an in-memory [`Transport`] that records every operation and lets
//! tests inject inbound messages without a broker.

use crate::transport::{MessageCallback, Transport};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub type PublishedMessage = (String, Vec<u8>);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock transport for testing
#[derive(Default)]
pub struct MockTransport {
    pub published_messages: Arc<Mutex<Vec<PublishedMessage>>>,
    pub subscribed_topics: Arc<Mutex<BTreeSet<String>>>,
    callback: Mutex<Option<MessageCallback>>,
    connected: AtomicBool,
    shut_down: AtomicBool,
    pub should_fail: bool,
    pub dropped_publishes: AtomicUsize,
    pub connect_calls: AtomicUsize,
    pub disconnect_calls: AtomicUsize,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("published", &lock(&self.published_messages).len())
            .field("subscriptions", &*lock(&self.subscribed_topics))
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose connect attempts never succeed
    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    /// A transport that is already connected
    pub fn connected() -> Self {
        let transport = Self::new();
        transport.connected.store(true, Ordering::Release);
        transport
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        lock(&self.published_messages).clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        lock(&self.subscribed_topics).iter().cloned().collect()
    }

    pub fn has_callback(&self) -> bool {
        lock(&self.callback).is_some()
    }

    /// Deliver a message to the registered callback. Returns false when none is set.
    pub fn simulate_message(&self, topic: &str, payload: &[u8]) -> bool {
        let callback = lock(&self.callback).clone();
        match callback {
            Some(callback) => {
                callback(topic, payload);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn connect(&self) {
        self.connect_calls.fetch_add(1, Ordering::Relaxed);
        if !self.should_fail && !self.shut_down.load(Ordering::Acquire) {
            self.connected.store(true, Ordering::Release);
        }
    }

    async fn disconnect(&self, _drain_timeout: Duration) {
        self.disconnect_calls.fetch_add(1, Ordering::Relaxed);
        self.shut_down.store(true, Ordering::Release);
        self.connected.store(false, Ordering::Release);
    }

    fn subscribe(&self, topic: &str) {
        lock(&self.subscribed_topics).insert(topic.to_string());
    }

    fn unsubscribe(&self, topic: &str) {
        lock(&self.subscribed_topics).remove(topic);
    }

    fn publish(&self, topic: &str, payload: Vec<u8>) {
        if !self.is_connected() {
            self.dropped_publishes.fetch_add(1, Ordering::Relaxed);
            return;
        }
        lock(&self.published_messages).push((topic.to_string(), payload));
    }

    fn set_message_callback(&self, callback: Option<MessageCallback>) {
        *lock(&self.callback) = callback;
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn is_subscribed(&self) -> bool {
        self.is_connected() && !lock(&self.subscribed_topics).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_transport_lifecycle() {
        let transport = MockTransport::new();
        assert!(!transport.is_connected());

        transport.connect();
        transport.subscribe("scenescape/data/camera/+");
        assert!(transport.is_connected());
        assert!(transport.is_subscribed());

        transport.disconnect(Duration::from_millis(10)).await;
        transport.connect();
        assert!(!transport.is_connected());
        assert!(!transport.is_subscribed());
        assert_eq!(transport.connect_calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_publish_dropped_while_disconnected() {
        let transport = MockTransport::new();

        transport.publish("a/b", b"early".to_vec());
        transport.connect();
        transport.publish("a/b", b"live".to_vec());
        transport.disconnect(Duration::from_millis(10)).await;
        transport.publish("a/b", b"late".to_vec());

        assert_eq!(transport.published(), vec![("a/b".to_string(), b"live".to_vec())]);
        assert_eq!(transport.dropped_publishes.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_mock_transport_failure() {
        let transport = MockTransport::with_failure();

        transport.connect();

        assert!(!transport.is_connected());
    }

    #[test]
    fn test_simulate_message_reaches_callback() {
        let transport = MockTransport::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        transport.set_message_callback(Some(Arc::new(move |topic: &str, payload: &[u8]| {
            lock(&sink).push((topic.to_string(), payload.to_vec()));
        })));

        assert!(transport.simulate_message("a/b", b"hello"));
        transport.set_message_callback(None);
        assert!(!transport.simulate_message("a/b", b"ignored"));

        assert_eq!(*lock(&seen), vec![("a/b".to_string(), b"hello".to_vec())]);
    }
}
