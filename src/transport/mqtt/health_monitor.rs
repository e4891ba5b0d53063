//! Pure connection state machine for the MQTT transport
//!
//! This module contains the transition table driven by broker and lifecycle
//! events, plus the logging that accompanies each transition.

use super::connection::ConnectionState;
use tracing::{debug, info, warn};

/// Pure state transition logic
pub struct HealthMonitor;

/// Events that drive connection state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// `connect()` started a fresh attempt
    ConnectStarted,
    /// The reconnect worker started attempt N (1-based)
    ReconnectionStarted(u32),
    /// ConnAck with a success code received
    ConnAckReceived,
    /// ConnAck received with a refusal code
    ConnAckRefused(String),
    /// Broker sent DISCONNECT
    DisconnectedByBroker,
    /// Network or protocol error from the event loop
    NetworkError(String),
    /// `disconnect()` was called
    ShutdownRequested,
    /// `disconnect()` finished tearing down the session
    ShutdownComplete,
}

impl HealthMonitor {
    /// Determine next state after a connection event (pure function)
    ///
    /// Once shutdown has been requested only `ShutdownComplete` moves the
    /// state; every other event is ignored.
    pub fn determine_next_state(
        current: ConnectionState,
        event: &ConnectionEvent,
    ) -> ConnectionState {
        if current == ConnectionState::ShuttingDown {
            return match event {
                ConnectionEvent::ShutdownComplete => ConnectionState::Disconnected,
                _ => ConnectionState::ShuttingDown,
            };
        }

        match event {
            ConnectionEvent::ConnectStarted => ConnectionState::Connecting,
            ConnectionEvent::ReconnectionStarted(_) => ConnectionState::Reconnecting,
            ConnectionEvent::ConnAckReceived => ConnectionState::Connected,
            ConnectionEvent::ConnAckRefused(_)
            | ConnectionEvent::DisconnectedByBroker
            | ConnectionEvent::NetworkError(_) => ConnectionState::Disconnected,
            ConnectionEvent::ShutdownRequested => ConnectionState::ShuttingDown,
            ConnectionEvent::ShutdownComplete => ConnectionState::Disconnected,
        }
    }

    /// Whether a lost or failed session should hand over to the reconnect worker
    pub fn should_reconnect(next: ConnectionState, stop_requested: bool) -> bool {
        !stop_requested && next == ConnectionState::Disconnected
    }

    /// Check if connection state allows publishing (pure function)
    pub fn can_publish(state: ConnectionState) -> bool {
        matches!(state, ConnectionState::Connected)
    }

    /// Check if connection state allows subscribing (pure function)
    pub fn can_subscribe(state: ConnectionState) -> bool {
        matches!(state, ConnectionState::Connected)
    }

    /// Log connection state transition (pure logging function)
    pub fn log_state_transition(
        from: ConnectionState,
        to: ConnectionState,
        event: &ConnectionEvent,
    ) {
        if from == to {
            return;
        }

        match (from, to, event) {
            (ConnectionState::Connecting, ConnectionState::Connected, _) => {
                info!("MQTT connection established");
            }
            (ConnectionState::Reconnecting, ConnectionState::Connected, _) => {
                info!("MQTT reconnection successful");
            }
            (ConnectionState::Connected, ConnectionState::Disconnected, reason) => {
                warn!(reason = ?reason, "MQTT connection lost");
            }
            (_, ConnectionState::Disconnected, ConnectionEvent::ConnAckRefused(code)) => {
                warn!(code = %code, "MQTT broker refused connection");
            }
            (_, ConnectionState::Disconnected, ConnectionEvent::NetworkError(error)) => {
                warn!(error = %error, "MQTT connection attempt failed");
            }
            (_, ConnectionState::Reconnecting, ConnectionEvent::ReconnectionStarted(attempt)) => {
                info!(attempt = attempt, "Starting MQTT reconnection attempt");
            }
            _ => {
                debug!("MQTT connection state: {} -> {}", from, to);
            }
        }
    }
}
