//! Webhook module for validating admission requests.
//!
//! This module provides a ValidatingAdmissionWebhook that requires workload
//! pod metadata to carry a fixed set of annotations:
//! - `policies`: the pure decision pipeline (namespace filter, kind dispatch, evaluation)
//! - `review`: the AdmissionReview envelope
//! - `server`: the HTTPS transport

mod error;
pub mod policies;
pub mod review;
mod server;

pub use error::{JSON_CONTENT_TYPE, TransportError};
pub use policies::{Decision, DecisionReason, RequiredAnnotations, ValidationContext, decide};
pub use review::{AdmissionRequest, AdmissionReviewRequest, AdmissionReviewResponse};
pub use server::{WebhookError, WebhookState, create_webhook_router, run_webhook_server};
