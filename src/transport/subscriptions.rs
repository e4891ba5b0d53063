//! Registry of topic filters that must be active on the broker
//!
//! The registry outlives individual broker sessions: every successful
//! (re)connect re-subscribes to whatever it holds at that moment.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

/// Thread-safe set of subscribed topic filters
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    topics: Mutex<BTreeSet<String>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<String>> {
        // A panic while holding this lock cannot leave the set half-updated
        self.topics.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a topic filter. Returns `false` if it was already present.
    pub fn insert(&self, topic: &str) -> bool {
        self.lock().insert(topic.to_string())
    }

    /// Remove a topic filter. Returns `false` if it was not present.
    pub fn remove(&self, topic: &str) -> bool {
        self.lock().remove(topic)
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.lock().contains(topic)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Copy of the current topic filters, in sorted order
    pub fn snapshot(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }
}
