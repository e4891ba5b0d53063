//! Message processing counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counts of what the router saw. Never reset.
#[derive(Debug, Default)]
pub struct ProcessingCounters {
    received: AtomicU64,
    published: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time copy of [`ProcessingCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub received: u64,
    pub published: u64,
    pub rejected: u64,
}

impl ProcessingCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            received: self.received.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counters_start_at_zero() {
        assert_eq!(ProcessingCounters::new().snapshot(), CounterSnapshot::default());
    }

    #[test]
    fn test_concurrent_increments() {
        let counters = Arc::new(ProcessingCounters::new());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counters = Arc::clone(&counters);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        counters.record_received();
                        counters.record_published();
                    }
                    counters.record_rejected();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(
            counters.snapshot(),
            CounterSnapshot {
                received: 1000,
                published: 1000,
                rejected: 4,
            }
        );
    }
}
