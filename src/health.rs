//! Health server for Kubernetes probes and Prometheus metrics.
//!
//! Provides:
//! - `/healthz` - Liveness probe (always returns 200 if server is running)
//! - `/readyz` - Readiness probe (returns 200 once the webhook listener is configured)
//! - `/metrics` - Prometheus metrics endpoint

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tracing::info;

use crate::webhooks::policies::{Decision, WorkloadKind};

/// `kind` label for requests naming a kind the webhook does not inspect
pub const UNSUPPORTED_KIND_LABEL: &str = "Unsupported";

/// Labels for admission decision metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DecisionLabels {
    pub kind: String,
    pub allowed: String,
    pub reason: String,
}

/// Labels for rejected HTTP exchanges
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TransportLabels {
    pub reason: String,
}

/// Shared metrics for the webhook
pub struct Metrics {
    /// Completed admission decisions
    pub admission_decisions_total: Family<DecisionLabels, Counter>,
    /// Time spent deciding, from envelope decode to response
    pub admission_duration_seconds: Histogram,
    /// Exchanges that ended in a non-2xx status
    pub transport_errors_total: Family<TransportLabels, Counter>,
    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let admission_decisions_total = Family::<DecisionLabels, Counter>::default();
        registry.register(
            "annotation_webhook_admission_decisions",
            "Total number of admission decisions",
            admission_decisions_total.clone(),
        );

        let admission_duration_seconds = Histogram::new(exponential_buckets(0.0001, 2.0, 15));
        registry.register(
            "annotation_webhook_admission_duration_seconds",
            "Duration of admission decisions in seconds",
            admission_duration_seconds.clone(),
        );

        let transport_errors_total = Family::<TransportLabels, Counter>::default();
        registry.register(
            "annotation_webhook_transport_errors",
            "Total number of rejected webhook HTTP requests",
            transport_errors_total.clone(),
        );

        Self {
            admission_decisions_total,
            admission_duration_seconds,
            transport_errors_total,
            registry,
        }
    }

    /// Record a completed decision
    ///
    /// `kind` comes straight from the request, so anything outside the
    /// supported set collapses into [`UNSUPPORTED_KIND_LABEL`].
    pub fn record_decision(&self, kind: &str, decision: &Decision, duration_secs: f64) {
        let kind = kind
            .parse::<WorkloadKind>()
            .map(|k| k.as_str())
            .unwrap_or(UNSUPPORTED_KIND_LABEL);
        let labels = DecisionLabels {
            kind: kind.to_string(),
            allowed: decision.allowed.to_string(),
            reason: decision.reason.as_str().to_string(),
        };
        self.admission_decisions_total.get_or_create(&labels).inc();
        self.admission_duration_seconds.observe(duration_secs);
    }

    /// Record an exchange rejected before or after deciding
    pub fn record_transport_error(&self, reason: &str) {
        let labels = TransportLabels {
            reason: reason.to_string(),
        };
        self.transport_errors_total.get_or_create(&labels).inc();
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Whether the webhook listener is configured and serving
    ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
        }
    }

    /// Mark the webhook as ready or not ready
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Check if the webhook is ready
    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

/// Liveness probe handler
///
/// Returns 200 OK if the process is alive.
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe handler
///
/// Returns 200 OK once TLS is loaded and the webhook is serving.
/// Returns 503 Service Unavailable otherwise, including during shutdown.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

/// Metrics handler
async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Run the health server on plain HTTP.
pub async fn run_health_server(
    state: Arc<HealthState>,
    addr: SocketAddr,
) -> Result<(), std::io::Error> {
    let app = create_router(state);

    info!(port = addr.port(), "Starting health server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
