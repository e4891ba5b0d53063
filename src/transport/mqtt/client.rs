//! Impure I/O operations for the MQTT transport
//!
//! This module owns the rumqttc session: it spawns the task that polls the
//! event loop, applies state transitions, re-asserts subscriptions after every
//! ConnAck and hands inbound messages to the registered callback.

use super::connection::{
    configure_mqtt_options, generate_client_id, AtomicConnectionState, ConnectionState,
    MqttError, CONNECT_TIMEOUT, QOS, REQUEST_CHANNEL_CAPACITY,
};
use super::health_monitor::{ConnectionEvent, HealthMonitor};
use super::message_handler::{EventRoute, MessageHandler};
use crate::config::MqttSection;
use crate::transport::backoff::BackoffPolicy;
use crate::transport::subscriptions::SubscriptionRegistry;
use crate::transport::{MessageCallback, Transport};
use async_trait::async_trait;
use rumqttc::{AsyncClient, ClientError, EventLoop, MqttOptions};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Non-blocking request side of a broker session
///
/// Implemented for [`rumqttc::AsyncClient`]; every call only enqueues a
/// request for the session task.
pub trait SessionClient: Send + Sync {
    fn subscribe(&self, topic: &str) -> Result<(), ClientError>;
    fn unsubscribe(&self, topic: &str) -> Result<(), ClientError>;
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), ClientError>;
    fn disconnect(&self) -> Result<(), ClientError>;
}

impl SessionClient for AsyncClient {
    fn subscribe(&self, topic: &str) -> Result<(), ClientError> {
        self.try_subscribe(topic, QOS)
    }

    fn unsubscribe(&self, topic: &str) -> Result<(), ClientError> {
        self.try_unsubscribe(topic)
    }

    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), ClientError> {
        self.try_publish(topic, QOS, false, payload)
    }

    fn disconnect(&self) -> Result<(), ClientError> {
        self.try_disconnect()
    }
}

/// Snapshot of transport activity counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub connection_attempts: u64,
    pub successful_connections: u64,
    pub connection_losses: u64,
    pub publishes_sent: u64,
    pub publishes_dropped: u64,
    pub messages_received: u64,
}

#[derive(Debug, Default)]
struct TransportCounters {
    connection_attempts: AtomicU64,
    successful_connections: AtomicU64,
    connection_losses: AtomicU64,
    publishes_sent: AtomicU64,
    publishes_dropped: AtomicU64,
    messages_received: AtomicU64,
}

impl TransportCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> TransportStats {
        TransportStats {
            connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
            successful_connections: self.successful_connections.load(Ordering::Relaxed),
            connection_losses: self.connection_losses.load(Ordering::Relaxed),
            publishes_sent: self.publishes_sent.load(Ordering::Relaxed),
            publishes_dropped: self.publishes_dropped.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
        }
    }
}

/// Whether the session task keeps polling after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SessionControl {
    Continue,
    Exit,
}

pub(super) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// State shared between the public handle, the session task and the
/// reconnect worker
pub(super) struct Shared {
    pub(super) client_id: String,
    options: MqttOptions,
    pub(super) backoff: BackoffPolicy,
    pub(super) state: AtomicConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    pub(super) shutdown_tx: watch::Sender<bool>,
    subscribed: AtomicBool,
    stop_requested: AtomicBool,
    pub(super) reconnecting: AtomicBool,
    generation: AtomicU64,
    registry: SubscriptionRegistry,
    callback: Mutex<Option<MessageCallback>>,
    client: Mutex<Option<Arc<dyn SessionClient>>>,
    session: Mutex<Option<JoinHandle<()>>>,
    pub(super) reconnect: Mutex<Option<JoinHandle<()>>>,
    counters: TransportCounters,
}

impl Shared {
    pub(super) fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    pub(super) fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    fn current_client(&self) -> Option<Arc<dyn SessionClient>> {
        lock(&self.client).clone()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    /// Apply `event` to the state machine and publish the result to waiters.
    ///
    /// The watch lock serialises transitions so the mirror never lags the atomic.
    pub(super) fn transition(&self, event: &ConnectionEvent) -> (ConnectionState, ConnectionState) {
        self.transition_if(event, |_| true)
    }

    fn transition_if<G>(
        &self,
        event: &ConnectionEvent,
        guard: G,
    ) -> (ConnectionState, ConnectionState)
    where
        G: Fn(ConnectionState) -> bool,
    {
        let mut result = (ConnectionState::Disconnected, ConnectionState::Disconnected);
        self.state_tx.send_if_modified(|mirror| {
            let (from, to) = self.state.update(|current| {
                if guard(current) {
                    HealthMonitor::determine_next_state(current, event)
                } else {
                    current
                }
            });
            *mirror = to;
            result = (from, to);
            from != to
        });
        HealthMonitor::log_state_transition(result.0, result.1, event);
        result
    }

    /// Start a fresh session if the transport is idle.
    ///
    /// Returns `false` when another attempt, a live session or shutdown got
    /// there first.
    pub(super) fn start_session(self: &Arc<Self>, event: ConnectionEvent) -> bool {
        let (from, to) = self.transition_if(&event, |current| {
            current == ConnectionState::Disconnected && !self.stop_requested()
        });
        if !to.is_attempting() || from == to {
            debug!(state = %from, "Connect request ignored");
            return false;
        }

        let (client, event_loop) = AsyncClient::new(self.options.clone(), REQUEST_CHANNEL_CAPACITY);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        *lock(&self.client) = Some(Arc::new(client));
        TransportCounters::bump(&self.counters.connection_attempts);

        info!(
            client_id = %self.client_id,
            generation = generation,
            "Starting MQTT session"
        );

        let mut slot = lock(&self.session);
        let shared = Arc::clone(self);
        let handle = tokio::spawn(async move {
            shared.run_session(event_loop, generation).await;
        });
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
        true
    }

    async fn run_session(self: Arc<Self>, mut event_loop: EventLoop, generation: u64) {
        loop {
            let polled = if self.state.load().is_attempting() {
                match tokio::time::timeout(CONNECT_TIMEOUT, event_loop.poll()).await {
                    Ok(result) => result,
                    Err(_) => {
                        if self.is_current(generation) {
                            self.on_session_lost(ConnectionEvent::NetworkError(format!(
                                "no ConnAck within {}s",
                                CONNECT_TIMEOUT.as_secs()
                            )));
                        }
                        break;
                    }
                }
            } else {
                event_loop.poll().await
            };

            if !self.is_current(generation) {
                debug!(generation = generation, "Stale MQTT session exiting");
                break;
            }

            match polled {
                Ok(event) => {
                    let route = MessageHandler::route_mqtt_event(&event);
                    if self.handle_route(route) == SessionControl::Exit {
                        break;
                    }
                }
                Err(e) => {
                    if self.stop_requested() {
                        debug!(error = %e, "MQTT event loop closed during shutdown");
                        break;
                    }
                    self.on_session_lost(ConnectionEvent::NetworkError(e.to_string()));
                    break;
                }
            }
        }
        trace!(generation = generation, "MQTT session task finished");
    }

    /// Process routed MQTT event
    pub(super) fn handle_route(self: &Arc<Self>, route: EventRoute) -> SessionControl {
        match route {
            EventRoute::ConnectionAcknowledged { session_present } => {
                let (_, to) = self.transition(&ConnectionEvent::ConnAckReceived);
                if to != ConnectionState::Connected {
                    return SessionControl::Continue;
                }
                TransportCounters::bump(&self.counters.successful_connections);
                debug!(session_present = session_present, "ConnAck received");
                self.resubscribe_to_topics();
                SessionControl::Continue
            }
            EventRoute::ConnectionRefused(code) => {
                self.on_session_lost(ConnectionEvent::ConnAckRefused(code));
                SessionControl::Exit
            }
            EventRoute::MessageReceived {
                topic,
                payload,
                retain,
            } => {
                TransportCounters::bump(&self.counters.messages_received);
                trace!(topic = %topic, retain = retain, bytes = payload.len(), "MQTT message received");
                self.dispatch(&topic, &payload);
                SessionControl::Continue
            }
            EventRoute::Disconnected => {
                if !self.stop_requested() {
                    self.on_session_lost(ConnectionEvent::DisconnectedByBroker);
                }
                SessionControl::Exit
            }
            EventRoute::SubscriptionConfirmed {
                packet_id,
                return_codes,
            } => {
                if let Err(e) = MessageHandler::validate_subscription_success(&return_codes) {
                    warn!(packet_id = packet_id, "{}", e);
                }
                let granted = MessageHandler::any_granted(&return_codes);
                self.subscribed.store(granted, Ordering::Release);
                debug!(packet_id = packet_id, granted = granted, "Subscription acknowledged");
                SessionControl::Continue
            }
            EventRoute::DisconnectSent => {
                if self.stop_requested() {
                    SessionControl::Exit
                } else {
                    SessionControl::Continue
                }
            }
            EventRoute::InfrastructureEvent(event) => {
                trace!(target: "mqtt_transport", "MQTT event: {}", event);
                SessionControl::Continue
            }
            EventRoute::OutgoingEvent => SessionControl::Continue,
        }
    }

    /// Record a failed or lost session and hand over to the reconnect worker
    fn on_session_lost(self: &Arc<Self>, event: ConnectionEvent) {
        let (from, to) = self.transition(&event);
        self.subscribed.store(false, Ordering::Release);
        if from == ConnectionState::Connected {
            TransportCounters::bump(&self.counters.connection_losses);
        }
        if HealthMonitor::should_reconnect(to, self.stop_requested()) {
            self.schedule_reconnect();
        }
    }

    fn resubscribe_to_topics(&self) {
        let topics = self.registry.snapshot();
        if topics.is_empty() {
            return;
        }
        let Some(client) = self.current_client() else {
            return;
        };
        for topic in topics {
            match client.subscribe(&topic) {
                Ok(()) => debug!(topic = %topic, "Re-subscribed"),
                Err(e) => error!(topic = %topic, error = %e, "Failed to re-subscribe"),
            }
        }
    }

    fn dispatch(&self, topic: &str, payload: &[u8]) {
        let callback = lock(&self.callback).clone();
        let Some(callback) = callback else {
            debug!(topic = %topic, "No message callback registered, dropping message");
            return;
        };
        if std::panic::catch_unwind(AssertUnwindSafe(|| callback(topic, payload))).is_err() {
            error!(topic = %topic, "Message callback panicked");
        }
    }
}

/// MQTT transport with automatic reconnection and subscription recovery
pub struct MqttTransport {
    shared: Arc<Shared>,
}

impl MqttTransport {
    /// Build a transport with the default backoff schedule.
    ///
    /// Fails only on invalid broker configuration or missing TLS files; no
    /// network activity happens until [`Transport::connect`].
    pub fn new(config: &MqttSection) -> Result<Self, MqttError> {
        Self::with_backoff(config, BackoffPolicy::default())
    }

    pub fn with_backoff(config: &MqttSection, backoff: BackoffPolicy) -> Result<Self, MqttError> {
        let client_id = generate_client_id();
        let options = configure_mqtt_options(&client_id, config)?;
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, _) = watch::channel(false);

        info!(
            client_id = %client_id,
            host = %config.host,
            port = config.port,
            tls = !config.insecure,
            "MQTT transport created"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                client_id,
                options,
                backoff,
                state: AtomicConnectionState::new(ConnectionState::Disconnected),
                state_tx,
                shutdown_tx,
                subscribed: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                reconnecting: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                registry: SubscriptionRegistry::new(),
                callback: Mutex::new(None),
                client: Mutex::new(None),
                session: Mutex::new(None),
                reconnect: Mutex::new(None),
                counters: TransportCounters::default(),
            }),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.shared.client_id
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state.load()
    }

    pub fn stats(&self) -> TransportStats {
        self.shared.counters.snapshot()
    }

    /// Topic filters that will be asserted on every connect
    pub fn subscriptions(&self) -> Vec<String> {
        self.shared.registry.snapshot()
    }
}

#[async_trait]
impl Transport for MqttTransport {
    fn connect(&self) {
        if self.shared.stop_requested() {
            debug!("Connect ignored after shutdown");
            return;
        }
        if self.shared.reconnecting.load(Ordering::Acquire) {
            debug!("Connect ignored while reconnect worker is active");
            return;
        }
        self.shared.start_session(ConnectionEvent::ConnectStarted);
    }

    async fn disconnect(&self, drain_timeout: Duration) {
        if self.shared.stop_requested.swap(true, Ordering::AcqRel) {
            debug!("MQTT transport already disconnected");
            return;
        }

        let (from, _) = self.shared.transition(&ConnectionEvent::ShutdownRequested);
        self.shared.shutdown_tx.send_replace(true);

        let worker = lock(&self.shared.reconnect).take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                if !e.is_cancelled() {
                    warn!("Reconnect worker ended with error: {}", e);
                }
            }
        }

        let session = lock(&self.shared.session).take();
        let client = lock(&self.shared.client).take();
        match (session, client) {
            (Some(mut session), Some(client)) if from == ConnectionState::Connected => {
                if let Err(e) = client.disconnect() {
                    warn!(error = %e, "Failed to enqueue MQTT DISCONNECT");
                }
                match tokio::time::timeout(drain_timeout, &mut session).await {
                    Ok(_) => debug!("MQTT session drained"),
                    Err(_) => {
                        warn!(
                            timeout_ms = drain_timeout.as_millis() as u64,
                            "MQTT session did not drain in time, aborting"
                        );
                        session.abort();
                    }
                }
            }
            (Some(session), _) => session.abort(),
            (None, Some(client)) if from == ConnectionState::Connected => {
                if let Err(e) = client.disconnect() {
                    debug!(error = %e, "Failed to enqueue MQTT DISCONNECT");
                }
            }
            _ => {}
        }

        self.shared.subscribed.store(false, Ordering::Release);
        self.shared.transition(&ConnectionEvent::ShutdownComplete);
        info!(client_id = %self.shared.client_id, "MQTT transport disconnected");
    }

    fn subscribe(&self, topic: &str) {
        if self.shared.registry.insert(topic) {
            debug!(topic = %topic, "Registered subscription");
        }

        let state = self.shared.state.load();
        if !HealthMonitor::can_subscribe(state) {
            debug!(topic = %topic, state = %state, "Subscription deferred until connected");
            return;
        }
        if let Some(client) = self.shared.current_client() {
            match client.subscribe(topic) {
                Ok(()) => info!(topic = %topic, "Subscribing"),
                Err(e) => warn!(topic = %topic, error = %e, "Subscribe request failed"),
            }
        }
    }

    fn unsubscribe(&self, topic: &str) {
        self.shared.registry.remove(topic);
        if self.shared.registry.is_empty() {
            self.shared.subscribed.store(false, Ordering::Release);
        }

        if !HealthMonitor::can_subscribe(self.shared.state.load()) {
            return;
        }
        if let Some(client) = self.shared.current_client() {
            match client.unsubscribe(topic) {
                Ok(()) => info!(topic = %topic, "Unsubscribing"),
                Err(e) => warn!(topic = %topic, error = %e, "Unsubscribe request failed"),
            }
        }
    }

    fn publish(&self, topic: &str, payload: Vec<u8>) {
        let state = self.shared.state.load();
        if !HealthMonitor::can_publish(state) {
            TransportCounters::bump(&self.shared.counters.publishes_dropped);
            warn!(topic = %topic, state = %state, "Dropping publish while not connected");
            return;
        }
        let Some(client) = self.shared.current_client() else {
            TransportCounters::bump(&self.shared.counters.publishes_dropped);
            return;
        };
        match client.publish(topic, payload) {
            Ok(()) => {
                TransportCounters::bump(&self.shared.counters.publishes_sent);
                trace!(topic = %topic, "Publish enqueued");
            }
            Err(e) => {
                TransportCounters::bump(&self.shared.counters.publishes_dropped);
                warn!(topic = %topic, error = %e, "Publish request failed");
            }
        }
    }

    fn set_message_callback(&self, callback: Option<MessageCallback>) {
        *lock(&self.shared.callback) = callback;
    }

    fn is_connected(&self) -> bool {
        self.shared.state.load() == ConnectionState::Connected
    }

    fn is_subscribed(&self) -> bool {
        self.shared.subscribed.load(Ordering::Acquire)
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        // Background tasks hold their own Arc; make sure they stop
        self.shared.stop_requested.store(true, Ordering::Release);
        self.shared.shutdown_tx.send_replace(true);

        if let Some(handle) = lock(&self.shared.reconnect).take() {
            handle.abort();
        }
        if let Some(handle) = lock(&self.shared.session).take() {
            handle.abort();
        }
    }
}
