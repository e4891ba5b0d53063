//! Backoff-driven reconnect worker
//!
//! One worker runs per disconnection episode. It owns the attempt counter,
//! sleeps according to the backoff policy and starts a fresh session after
//! each delay until a session reaches Connected or shutdown is signalled.

use super::client::{lock, Shared};
use super::connection::ConnectionState;
use super::health_monitor::{ConnectionEvent, HealthMonitor};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// What ended a wait inside the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Elapsed,
    Connected,
    Shutdown,
}

impl Shared {
    /// Arm the reconnect worker unless one is already running or shutdown
    /// has been requested.
    pub(super) fn schedule_reconnect(self: &Arc<Self>) {
        if self.stop_requested() {
            return;
        }
        if self.reconnecting.swap(true, Ordering::AcqRel) {
            debug!("Reconnect worker already active");
            return;
        }

        let mut slot = lock(&self.reconnect);
        let shared = Arc::clone(self);
        let handle = tokio::spawn(async move {
            shared.reconnect_loop().await;
            shared.reconnecting.store(false, Ordering::Release);

            // The connection may have dropped again after the loop saw Connected
            if HealthMonitor::should_reconnect(shared.state.load(), shared.stop_requested()) {
                shared.schedule_reconnect();
            }
        });
        *slot = Some(handle);
    }

    async fn reconnect_loop(self: &Arc<Self>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut state_rx = self.subscribe_state();
        let mut attempt: u32 = 0;

        loop {
            if self.stop_requested() {
                break;
            }

            match self.state.load() {
                ConnectionState::Connected | ConnectionState::ShuttingDown => break,
                ConnectionState::Connecting | ConnectionState::Reconnecting => {
                    // Someone else's attempt is in flight; let it resolve first
                    if wait_for_resolution(&mut state_rx, &mut shutdown_rx).await == Wake::Shutdown
                    {
                        break;
                    }
                    continue;
                }
                ConnectionState::Disconnected => {}
            }

            let delay = self.backoff.delay_for(attempt);
            info!(
                client_id = %self.client_id,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting to MQTT broker after delay"
            );

            match interruptible_sleep(&mut state_rx, &mut shutdown_rx, delay).await {
                Wake::Shutdown => {
                    info!("Shutdown signal received during reconnection delay, stopping");
                    break;
                }
                Wake::Connected => break,
                Wake::Elapsed => {}
            }

            attempt = attempt.saturating_add(1);
            if !self.start_session(ConnectionEvent::ReconnectionStarted(attempt)) {
                continue;
            }

            if wait_for_resolution(&mut state_rx, &mut shutdown_rx).await == Wake::Shutdown {
                break;
            }
        }

        debug!(attempts = attempt, "Reconnect worker finished");
    }
}

/// Sleep for `delay` unless the connection comes up or shutdown is signalled
async fn interruptible_sleep(
    state_rx: &mut watch::Receiver<ConnectionState>,
    shutdown_rx: &mut watch::Receiver<bool>,
    delay: Duration,
) -> Wake {
    tokio::select! {
        _ = shutdown_rx.wait_for(|stop| *stop) => Wake::Shutdown,
        _ = state_rx.wait_for(|state| *state == ConnectionState::Connected) => Wake::Connected,
        _ = tokio::time::sleep(delay) => Wake::Elapsed,
    }
}

/// Wait until the in-flight attempt either connects or fails
async fn wait_for_resolution(
    state_rx: &mut watch::Receiver<ConnectionState>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Wake {
    tokio::select! {
        _ = shutdown_rx.wait_for(|stop| *stop) => Wake::Shutdown,
        result = state_rx.wait_for(|state| !state.is_attempting()) => match result {
            Ok(state) if *state == ConnectionState::Connected => Wake::Connected,
            Ok(_) => Wake::Elapsed,
            Err(_) => Wake::Shutdown,
        },
    }
}
