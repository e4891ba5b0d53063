//! Liveness and readiness probes for container orchestration
//!
//! `GET /healthz` reports whether the process is alive and `GET /readyz`
//! whether the tracker is connected to the broker with its camera
//! subscription confirmed. The `healthcheck` CLI subcommand uses
//! [`run_healthcheck`] to query these endpoints from inside the container.

use crate::error::TrackerError;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use warp::http::StatusCode;
use warp::Filter;

/// Timeout applied by the healthcheck probe client
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Default endpoint queried by the healthcheck probe
pub const DEFAULT_PROBE_ENDPOINT: &str = "/readyz";

/// Predicate deciding readiness at request time
pub type ReadinessSource = Arc<dyn Fn() -> bool + Send + Sync>;

/// Body of both probe endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProbeResponse {
    pub status: &'static str,
}

/// Liveness answer: 200 `healthy` or 503 `unhealthy`
pub fn handle_healthz(alive: bool) -> (StatusCode, ProbeResponse) {
    if alive {
        (StatusCode::OK, ProbeResponse { status: "healthy" })
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            ProbeResponse {
                status: "unhealthy",
            },
        )
    }
}

/// Readiness answer: 200 `ready` or 503 `notready`
pub fn handle_readyz(ready: bool) -> (StatusCode, ProbeResponse) {
    if ready {
        (StatusCode::OK, ProbeResponse { status: "ready" })
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            ProbeResponse { status: "notready" },
        )
    }
}

fn reply((status, body): (StatusCode, ProbeResponse)) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(warp::reply::json(&body), status)
}

/// HTTP probe server
pub struct HealthServer {
    port: u16,
    liveness: Arc<AtomicBool>,
    readiness: ReadinessSource,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl HealthServer {
    /// Create new health server. Port 0 binds an ephemeral port.
    pub fn new(port: u16, readiness: ReadinessSource) -> Self {
        Self {
            port,
            liveness: Arc::new(AtomicBool::new(false)),
            readiness,
            shutdown_tx: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    pub fn set_alive(&self, alive: bool) {
        self.liveness.store(alive, Ordering::Release);
    }

    pub fn is_alive(&self) -> bool {
        self.liveness.load(Ordering::Acquire)
    }

    /// Probe routes, usable without binding a socket
    pub fn routes(
        &self,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        let liveness = Arc::clone(&self.liveness);
        let readiness = Arc::clone(&self.readiness);

        // GET /healthz - liveness probe
        let healthz = warp::path("healthz")
            .and(warp::path::end())
            .and(warp::get())
            .map(move || reply(handle_healthz(liveness.load(Ordering::Acquire))));

        // GET /readyz - readiness probe
        let readyz = warp::path("readyz")
            .and(warp::path::end())
            .and(warp::get())
            .map(move || reply(handle_readyz(readiness())));

        healthz.or(readyz)
    }

    /// Bind and serve in the background, marking the process alive.
    ///
    /// Returns the bound address.
    pub fn start(&self) -> Result<SocketAddr, TrackerError> {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let signal = async move {
            let _ = shutdown_rx.await;
        };

        let (addr, server) = warp::serve(self.routes())
            .try_bind_with_graceful_shutdown(([0, 0, 0, 0], self.port), signal)?;

        self.set_alive(true);
        info!(port = addr.port(), "Healthcheck server listening");

        if let Ok(mut slot) = self.shutdown_tx.lock() {
            *slot = Some(shutdown_tx);
        }
        let handle = tokio::spawn(server);
        if let Ok(mut slot) = self.handle.lock() {
            *slot = Some(handle);
        }

        Ok(addr)
    }

    /// Mark the process not alive and stop serving. Safe to call more than once.
    pub async fn stop(&self) {
        self.set_alive(false);

        let shutdown_tx = self.shutdown_tx.lock().ok().and_then(|mut slot| slot.take());
        let Some(shutdown_tx) = shutdown_tx else {
            return;
        };
        let _ = shutdown_tx.send(());

        let handle = self.handle.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Healthcheck server task failed");
            }
        }
        debug!("Healthcheck server stopped");
    }
}

/// Ensure the endpoint has a leading `/`; `None` for an empty endpoint
pub fn normalize_endpoint(endpoint: &str) -> Option<String> {
    if endpoint.is_empty() {
        None
    } else if endpoint.starts_with('/') {
        Some(endpoint.to_string())
    } else {
        Some(format!("/{endpoint}"))
    }
}

/// Query `http://localhost:{port}{endpoint}`; true only for HTTP 200
pub async fn run_healthcheck(endpoint: &str, port: u16) -> bool {
    let Some(endpoint) = normalize_endpoint(endpoint) else {
        return false;
    };
    if port == 0 {
        return false;
    }

    let client = match reqwest::Client::builder().timeout(PROBE_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            debug!(error = %e, "Failed to build probe client");
            return false;
        }
    };

    match client
        .get(format!("http://localhost:{port}{endpoint}"))
        .send()
        .await
    {
        Ok(response) => response.status() == reqwest::StatusCode::OK,
        Err(e) => {
            debug!(error = %e, "Healthcheck request failed");
            false
        }
    }
}
