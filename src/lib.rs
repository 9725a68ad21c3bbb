//! annotation-webhook library crate
//!
//! This module exports the admission decision pipeline, the webhook
//! transport, configuration, and the health server.

pub mod config;
pub mod health;
pub mod webhooks;

pub use config::{ConfigError, WebhookConfig};
pub use health::HealthState;
pub use webhooks::{
    Decision, DecisionReason, RequiredAnnotations, ValidationContext, WebhookError, decide,
    run_webhook_server,
};
