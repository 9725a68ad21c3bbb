//! Admission webhook server.
//!
//! Provides the HTTPS endpoint the API server calls for every matching
//! workload write.
//!
//! To enable the webhook:
//! 1. Provision a TLS certificate for the webhook Service
//! 2. Mount the key pair at /etc/webhook/certs/ (or set WEBHOOK_CERT_PATH and WEBHOOK_KEY_PATH)
//! 3. Create a ValidatingWebhookConfiguration targeting the configured path

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    extract::{Request, State},
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::any,
};
use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::WebhookConfig;
use crate::health::HealthState;
use crate::webhooks::error::{JSON_CONTENT_TYPE, TransportError};
use crate::webhooks::policies::{RequiredAnnotations, decide};
use crate::webhooks::review::{AdmissionReviewRequest, AdmissionReviewResponse};

/// Shared state for webhook handlers
pub struct WebhookState {
    /// Required annotation table, fixed at startup
    pub required_annotations: RequiredAnnotations,
    /// Upper bound on the request body
    pub max_body_bytes: usize,
    /// Metrics sink, absent in tests
    pub health: Option<Arc<HealthState>>,
}

impl WebhookState {
    pub fn new(required_annotations: RequiredAnnotations, max_body_bytes: usize) -> Self {
        Self {
            required_annotations,
            max_body_bytes,
            health: None,
        }
    }

    pub fn with_health(mut self, health: Arc<HealthState>) -> Self {
        self.health = Some(health);
        self
    }
}

/// Create the webhook router serving `path`.
///
/// Every method is routed to the handler so non-POST requests get a
/// diagnostic body along with the 405.
pub fn create_webhook_router(state: Arc<WebhookState>, path: &str) -> Router {
    Router::new()
        .route(path, any(validate_workload))
        .with_state(state)
}

/// Admission handler for workload objects
async fn validate_workload(
    State(state): State<Arc<WebhookState>>,
    request: Request,
) -> Response {
    debug!(method = %request.method(), "Handling webhook request");

    match review(&state, request).await {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(
                error = %e,
                status = e.status_code().as_u16(),
                "Error handling webhook request"
            );
            if let Some(health) = &state.health {
                health.metrics.record_transport_error(e.reason());
            }
            e.into_response()
        }
    }
}

/// Validate one exchange and produce the serialized response envelope.
async fn review(state: &WebhookState, request: Request) -> Result<Vec<u8>, TransportError> {
    let (parts, body) = request.into_parts();

    if parts.method != Method::POST {
        return Err(TransportError::MethodNotAllowed(parts.method.to_string()));
    }

    let body = axum::body::to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|e| TransportError::BodyRead(e.to_string()))?;

    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .unwrap_or_default();
    if content_type != JSON_CONTENT_TYPE {
        return Err(TransportError::UnsupportedContentType(content_type));
    }

    if body.is_empty() {
        return Err(TransportError::EmptyBody);
    }

    let AdmissionReviewRequest {
        api_version,
        request,
    } = serde_json::from_slice(&body).map_err(TransportError::Deserialize)?;
    let request = request.ok_or(TransportError::MissingRequest)?;

    let started = Instant::now();
    let ctx = request.validation_context();
    let decision = decide(&ctx, &state.required_annotations);

    if decision.allowed {
        info!(
            uid = %request.uid,
            kind = %ctx.kind,
            namespace = %ctx.namespace,
            name = ?request.name,
            operation = ?request.operation,
            reason = %decision.reason,
            "Admission request allowed"
        );
    } else {
        warn!(
            uid = %request.uid,
            kind = %ctx.kind,
            namespace = %ctx.namespace,
            name = ?request.name,
            operation = ?request.operation,
            reason = %decision.reason,
            detail = %decision.message,
            "Admission request denied"
        );
    }
    if let Some(health) = &state.health {
        health
            .metrics
            .record_decision(ctx.kind, &decision, started.elapsed().as_secs_f64());
    }

    let response = AdmissionReviewResponse::new(api_version.as_deref(), &request.uid, decision);
    serde_json::to_vec(&response).map_err(TransportError::Serialize)
}

/// Errors that can occur when running the webhook server
#[derive(Error, Debug)]
pub enum WebhookError {
    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),
    /// Server error
    #[error("Webhook server error: {0}")]
    Server(String),
}

/// Run the webhook server with TLS
///
/// Loads the PEM key pair from the configured paths, marks the process ready,
/// and serves the validation endpoint until the listener fails.
pub async fn run_webhook_server(
    config: &WebhookConfig,
    health: Arc<HealthState>,
) -> Result<(), WebhookError> {
    let state = Arc::new(
        WebhookState::new(config.required_annotations.clone(), config.max_body_bytes)
            .with_health(health.clone()),
    );
    let app = create_webhook_router(state, &config.path);

    let tls = RustlsConfig::from_pem_file(&config.cert_path, &config.key_path)
        .await
        .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

    let addr = config.webhook_addr();
    info!(
        port = addr.port(),
        path = %config.path,
        required = ?config.required_annotations,
        "Webhook server listening with TLS"
    );
    health.set_ready(true).await;

    axum_server::bind_rustls(addr, tls)
        .serve(app.into_make_service())
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))?;

    Ok(())
}
