//! Validation policies for workload admission.
//!
//! Every request runs the same pipeline:
//! 1. Namespace exemption (control-plane namespaces are always admitted)
//! 2. Kind dispatch (decode the object, find the pod annotations)
//! 3. Required annotation evaluation (all failures collected)
//!
//! The outcome is folded into a [`Decision`]. Nothing here performs I/O or
//! keeps state between calls, so the same inputs always give the same answer.

pub mod annotations;
pub mod kinds;
pub mod namespace;

use std::fmt;

use tracing::{debug, warn};

pub use annotations::{
    AnnotationMatcher, AnnotationSet, AnyValue, Pattern, RequiredAnnotations, Violation,
    ViolationSet, evaluate,
};
pub use kinds::{ExtractError, ExtractedWorkload, WorkloadKind, extract};
pub use namespace::{EXEMPT_NAMESPACES, is_exempt};

/// Message for a declared kind with no extraction strategy.
pub const UNSUPPORTED_KIND_MESSAGE: &str =
    "the submitted Kind is not supported by this admission handler";
/// Message for an object that did not decode as its declared kind.
pub const DECODE_FAILURE_MESSAGE: &str = "unable to decode request from server";
/// Prefix of the message listing annotation violations.
pub const MISSING_ANNOTATIONS_MESSAGE: &str =
    "the submitted Pods are missing required annotations";
/// Prefix used instead when a required key has no matcher configured.
pub const MISCONFIGURED_MESSAGE: &str = "cannot validate required annotations";
/// Message of a decision no branch has resolved.
pub const UNKNOWN_MESSAGE: &str = "Unknown";

/// Machine-readable reason attached to every decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionReason {
    /// No branch resolved the decision
    Unknown,
    /// Namespace is owned by the control plane
    NamespaceExempt,
    /// Declared kind is not supported
    UnsupportedKind,
    /// Object did not decode as the declared kind
    DecodeFailed,
    /// Required annotations missing, rejected, or misconfigured
    MissingAnnotations,
    /// Every required annotation satisfied
    Allowed,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::Unknown => "Unknown",
            DecisionReason::NamespaceExempt => "NamespaceExempt",
            DecisionReason::UnsupportedKind => "UnsupportedKind",
            DecisionReason::DecodeFailed => "DecodeFailed",
            DecisionReason::MissingAnnotations => "MissingAnnotations",
            DecisionReason::Allowed => "Allowed",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running the admission pipeline for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Whether the object may be persisted
    pub allowed: bool,
    /// Stable reason token
    pub reason: DecisionReason,
    /// Human-readable status message (empty on a clean allow)
    pub message: String,
}

/// Fail closed: a decision nobody filled in is a denial.
impl Default for Decision {
    fn default() -> Self {
        Self {
            allowed: false,
            reason: DecisionReason::Unknown,
            message: UNKNOWN_MESSAGE.to_string(),
        }
    }
}

impl Decision {
    fn allow(reason: DecisionReason, message: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason,
            message: message.into(),
        }
    }

    fn deny(reason: DecisionReason, message: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason,
            message: message.into(),
        }
    }
}

/// What the pipeline found before assembling a decision.
#[derive(Debug)]
pub enum Outcome<'a> {
    /// Namespace exempt; nothing was decoded
    Exempt { namespace: &'a str },
    /// Extraction failed
    Rejected(ExtractError),
    /// Object decoded and evaluated
    Evaluated(ViolationSet),
}

/// Inputs of one admission decision.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    /// Declared kind name from the request
    pub kind: &'a str,
    /// Namespace the request targets
    pub namespace: &'a str,
    /// Raw serialized object
    pub object: &'a [u8],
}

/// Turn a pipeline outcome into a decision.
pub fn assemble(outcome: Outcome<'_>) -> Decision {
    match outcome {
        Outcome::Exempt { namespace } => Decision::allow(
            DecisionReason::NamespaceExempt,
            format!("allowing admission: {} namespace is exempt", namespace),
        ),
        Outcome::Rejected(ExtractError::UnsupportedKind(_)) => {
            Decision::deny(DecisionReason::UnsupportedKind, UNSUPPORTED_KIND_MESSAGE)
        }
        Outcome::Rejected(ExtractError::Decode { .. }) => {
            Decision::deny(DecisionReason::DecodeFailed, DECODE_FAILURE_MESSAGE)
        }
        Outcome::Evaluated(violations) if violations.has_misconfiguration() => Decision::deny(
            DecisionReason::MissingAnnotations,
            format!("{}: {}", MISCONFIGURED_MESSAGE, violations),
        ),
        Outcome::Evaluated(violations) if !violations.is_empty() => Decision::deny(
            DecisionReason::MissingAnnotations,
            format!("{}: {}", MISSING_ANNOTATIONS_MESSAGE, violations),
        ),
        Outcome::Evaluated(_) => Decision::allow(DecisionReason::Allowed, ""),
    }
}

/// Run the full pipeline for one request.
pub fn decide(ctx: &ValidationContext<'_>, table: &RequiredAnnotations) -> Decision {
    if is_exempt(ctx.namespace) {
        return assemble(Outcome::Exempt {
            namespace: ctx.namespace,
        });
    }

    let outcome = match extract(ctx.kind, ctx.object) {
        Ok(workload) => {
            let violations = evaluate(&workload.annotations, table);
            debug!(
                kind = %ctx.kind,
                namespace = %ctx.namespace,
                object_namespace = %workload.namespace,
                violations = violations.len(),
                "Evaluated required annotations"
            );
            Outcome::Evaluated(violations)
        }
        Err(e) => {
            if let ExtractError::Decode { .. } = e {
                warn!(
                    kind = %ctx.kind,
                    namespace = %ctx.namespace,
                    error = %e,
                    "Failed to decode admission object"
                );
            }
            Outcome::Rejected(e)
        }
    };

    assemble(outcome)
}
