//! Transport errors for the webhook endpoint.
//!
//! These end an exchange with a non-2xx status and a plain-text body. Policy
//! denials are not errors; they are successful responses with `allowed: false`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Media type accepted and produced by the webhook.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Reasons an exchange cannot produce an admission decision.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("invalid method {0}, only POST requests are allowed")]
    MethodNotAllowed(String),

    #[error("could not read request body: {0}")]
    BodyRead(String),

    #[error("request body is empty")]
    EmptyBody,

    #[error("unsupported content type {0:?}, only application/json is supported")]
    UnsupportedContentType(String),

    #[error("could not deserialize request: {0}")]
    Deserialize(#[source] serde_json::Error),

    #[error("malformed admission review: request is missing")]
    MissingRequest,

    #[error("could not serialize response: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl TransportError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            TransportError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            TransportError::BodyRead(_)
            | TransportError::EmptyBody
            | TransportError::UnsupportedContentType(_)
            | TransportError::Deserialize(_)
            | TransportError::MissingRequest => StatusCode::BAD_REQUEST,
            TransportError::Serialize(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short token used as a metrics label.
    pub fn reason(&self) -> &'static str {
        match self {
            TransportError::MethodNotAllowed(_) => "MethodNotAllowed",
            TransportError::BodyRead(_) => "BodyRead",
            TransportError::EmptyBody => "EmptyBody",
            TransportError::UnsupportedContentType(_) => "UnsupportedContentType",
            TransportError::Deserialize(_) => "Deserialize",
            TransportError::MissingRequest => "MissingRequest",
            TransportError::Serialize(_) => "Serialize",
        }
    }
}

impl IntoResponse for TransportError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}
