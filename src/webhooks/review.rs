//! AdmissionReview envelope.
//!
//! Only the fields the webhook reads are modelled. The embedded object is
//! kept as raw JSON so a malformed object is judged by the decision pipeline
//! (a denial) rather than by envelope decoding (a 400).

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use super::policies::{Decision, ValidationContext};

/// `apiVersion` used when the request does not carry one.
pub const ADMISSION_API_VERSION: &str = "admission.k8s.io/v1";
/// `kind` of both envelopes.
pub const ADMISSION_REVIEW_KIND: &str = "AdmissionReview";

/// Inbound AdmissionReview.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReviewRequest {
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub request: Option<AdmissionRequest>,
}

/// The `request` section of an inbound review.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    /// Correlation identifier, echoed verbatim
    pub uid: String,
    /// Declared kind of the object
    pub kind: GroupVersionKind,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub object: Option<Box<RawValue>>,
}

/// Group/version/kind triple of the reviewed object.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupVersionKind {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    pub kind: String,
}

impl AdmissionRequest {
    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or_default()
    }

    /// Raw object bytes; empty when the request carries no object.
    pub fn object_bytes(&self) -> &[u8] {
        self.object
            .as_deref()
            .map(|raw| raw.get().as_bytes())
            .unwrap_or_default()
    }

    /// Inputs for the decision pipeline.
    pub fn validation_context(&self) -> ValidationContext<'_> {
        ValidationContext {
            kind: &self.kind.kind,
            namespace: self.namespace(),
            object: self.object_bytes(),
        }
    }
}

/// Outbound AdmissionReview.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReviewResponse {
    pub api_version: String,
    pub kind: String,
    pub response: AdmissionResponse,
}

/// The `response` section of an outbound review.
#[derive(Debug, Serialize)]
pub struct AdmissionResponse {
    pub uid: String,
    pub allowed: bool,
    pub status: ResponseStatus,
}

/// Status attached to a response.
#[derive(Debug, Serialize)]
pub struct ResponseStatus {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AdmissionReviewResponse {
    /// Wrap `decision` for the request identified by `uid`.
    pub fn new(api_version: Option<&str>, uid: &str, decision: Decision) -> Self {
        Self {
            api_version: api_version.unwrap_or(ADMISSION_API_VERSION).to_string(),
            kind: ADMISSION_REVIEW_KIND.to_string(),
            response: AdmissionResponse {
                uid: uid.to_string(),
                allowed: decision.allowed,
                status: ResponseStatus {
                    message: decision.message,
                    reason: Some(decision.reason.as_str().to_string()),
                },
            },
        }
    }
}
