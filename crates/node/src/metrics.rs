//! Prometheus metrics for a storage node.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use axum::{Json, Router};
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use keel_ring::Ring;
use prometheus::{Encoder, IntCounter, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::StartupMode;
use crate::autojoin::JoinOutcome;

/// Path metrics are served on.
pub const METRICS_PATH: &str = "/metrics";

/// Path of the JSON debug snapshot.
pub const DEBUG_VARS_PATH: &str = "/debug/vars";

/// Errors in metrics collection or serving.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// A metric could not be registered or encoded.
    #[error(transparent)]
    Prometheus(#[from] prometheus::Error),

    /// The metrics address could not be resolved or bound.
    #[error("couldn't listen for metrics on {0}: {1}")]
    Bind(String, #[source] std::io::Error),
}

/// Metrics of one storage node, in their own registry.
pub struct NodeMetrics {
    registry: Registry,
    ring_version: IntGauge,
    ring_members: IntGauge,
    block_capacity: IntGauge,
    autojoin_attempts: IntCounter,
    autojoin_conflicts: IntCounter,
    startup_mode: IntGaugeVec,
    mode: OnceLock<StartupMode>,
    started: Instant,
}

/// Point-in-time view of a node, served on [`DEBUG_VARS_PATH`].
#[derive(Clone, Debug, Serialize)]
pub struct DebugVars {
    /// Version of `keeld`
    pub version: &'static str,
    /// Mode the node started in, once known
    pub mode: Option<&'static str>,
    /// Seconds since the metrics were created
    pub uptime_seconds: u64,
    /// Version of the last ring seen
    pub ring_version: i64,
    /// Members of the last ring seen
    pub ring_members: i64,
    /// Blocks this node contributes
    pub block_capacity: i64,
    /// Rounds spent joining the ring
    pub autojoin_attempts: u64,
    /// Ring writes rejected while joining
    pub autojoin_conflicts: u64,
}

impl NodeMetrics {
    /// Create and register the node metrics.
    ///
    /// # Errors
    ///
    /// Fails if a metric cannot be registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let ring_version = IntGauge::new("keel_ring_version", "Version of the last ring seen")?;
        let ring_members = IntGauge::new("keel_ring_members", "Members of the last ring seen")?;
        let block_capacity = IntGauge::new(
            "keel_block_capacity",
            "Blocks this node contributes to the cluster",
        )?;
        let autojoin_attempts = IntCounter::new(
            "keel_autojoin_attempts_total",
            "Read-modify-write rounds spent joining the ring",
        )?;
        let autojoin_conflicts = IntCounter::new(
            "keel_autojoin_conflicts_total",
            "Ring writes rejected while joining",
        )?;
        let startup_mode = IntGaugeVec::new(
            Opts::new("keel_startup_mode", "Mode the node started in"),
            &["mode", "metadata", "blocks"],
        )?;

        registry.register(Box::new(ring_version.clone()))?;
        registry.register(Box::new(ring_members.clone()))?;
        registry.register(Box::new(block_capacity.clone()))?;
        registry.register(Box::new(autojoin_attempts.clone()))?;
        registry.register(Box::new(autojoin_conflicts.clone()))?;
        registry.register(Box::new(startup_mode.clone()))?;

        Ok(Self {
            registry,
            ring_version,
            ring_members,
            block_capacity,
            autojoin_attempts,
            autojoin_conflicts,
            startup_mode,
            mode: OnceLock::new(),
            started: Instant::now(),
        })
    }

    /// Record how the node started and what it contributes.
    pub fn record_startup(&self, mode: StartupMode, num_blocks: u64) {
        self.startup_mode
            .with_label_values(&[
                mode.as_str(),
                mode.metadata_backend().as_str(),
                mode.block_backend().as_str(),
            ])
            .set(1);
        self.block_capacity.set(saturating_i64(num_blocks));
        let _ = self.mode.set(mode);
    }

    /// Record a ring snapshot.
    pub fn record_ring(&self, ring: &Ring) {
        self.ring_version.set(saturating_i64(ring.version()));
        self.ring_members
            .set(i64::try_from(ring.peers().len()).unwrap_or(i64::MAX));
    }

    /// Record the rounds an autojoin took.
    pub fn record_join(&self, outcome: JoinOutcome) {
        let attempts = outcome.attempts();
        self.autojoin_attempts.inc_by(attempts);
        self.autojoin_conflicts.inc_by(attempts.saturating_sub(1));
        if let JoinOutcome::Joined { version, .. } = outcome {
            self.ring_version.set(saturating_i64(version));
        }
    }

    /// Snapshot of the node for debugging.
    #[must_use]
    pub fn debug_vars(&self) -> DebugVars {
        DebugVars {
            version: env!("CARGO_PKG_VERSION"),
            mode: self.mode.get().map(|mode| mode.as_str()),
            uptime_seconds: self.started.elapsed().as_secs(),
            ring_version: self.ring_version.get(),
            ring_members: self.ring_members.get(),
            block_capacity: self.block_capacity.get(),
            autojoin_attempts: self.autojoin_attempts.get(),
            autojoin_conflicts: self.autojoin_conflicts.get(),
        }
    }

    /// Render all metrics in the Prometheus text format.
    ///
    /// # Errors
    ///
    /// Fails if encoding fails.
    pub fn render(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl fmt::Debug for NodeMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeMetrics")
            .field("ring_version", &self.ring_version.get())
            .field("ring_members", &self.ring_members.get())
            .field("block_capacity", &self.block_capacity.get())
            .finish_non_exhaustive()
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Router serving `metrics` on [`METRICS_PATH`] and a debug snapshot on
/// [`DEBUG_VARS_PATH`].
pub fn router(metrics: Arc<NodeMetrics>) -> Router {
    Router::new()
        .route(METRICS_PATH, get(serve_metrics))
        .route(DEBUG_VARS_PATH, get(serve_debug_vars))
        .with_state(metrics)
}

async fn serve_debug_vars(State(metrics): State<Arc<NodeMetrics>>) -> Json<DebugVars> {
    Json(metrics.debug_vars())
}

async fn serve_metrics(State(metrics): State<Arc<NodeMetrics>>) -> impl IntoResponse {
    match metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("error rendering metrics: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Bind `address` and serve metrics on it until `shutdown` is cancelled.
///
/// Binding happens before returning so that a bad address is reported to
/// the caller; serving runs as its own task.
///
/// # Errors
///
/// Fails if the address cannot be resolved or bound.
pub async fn serve(
    address: &str,
    metrics: Arc<NodeMetrics>,
    shutdown: CancellationToken,
) -> Result<(SocketAddr, JoinHandle<()>), MetricsError> {
    let address = listen_address(address);
    let listener = TcpListener::bind(address.as_str())
        .await
        .map_err(|e| MetricsError::Bind(address.clone(), e))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| MetricsError::Bind(address.clone(), e))?;

    let handle = tokio::spawn(async move {
        let result = axum::serve(listener, router(metrics))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = result {
            error!("metrics server exited: {e}");
        }
    });

    info!("serving metrics on http://{local_addr}{METRICS_PATH}");
    Ok((local_addr, handle))
}

/// Expand a `:port` address to listen on all interfaces.
///
/// Anything else is passed through and resolved when bound, so host names
/// such as `localhost:9100` work.
#[must_use]
pub fn listen_address(address: &str) -> String {
    let address = address.trim();
    if address.starts_with(':') {
        format!("0.0.0.0{address}")
    } else {
        address.to_string()
    }
}
