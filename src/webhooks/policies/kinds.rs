//! Workload kind dispatch.
//!
//! Decodes the embedded object for each supported kind and pulls out the
//! annotations that end up on the created Pods: a Pod's own metadata, or the
//! pod template of the controllers that create Pods indirectly.

use std::fmt;
use std::str::FromStr;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::{Pod, PodTemplateSpec};
use serde::de::DeserializeOwned;
use thiserror::Error;

use super::annotations::AnnotationSet;

/// Workload kinds this webhook knows how to inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkloadKind {
    Pod,
    Deployment,
    ReplicaSet,
    StatefulSet,
    DaemonSet,
}

impl WorkloadKind {
    pub const ALL: [WorkloadKind; 5] = [
        WorkloadKind::Pod,
        WorkloadKind::Deployment,
        WorkloadKind::ReplicaSet,
        WorkloadKind::StatefulSet,
        WorkloadKind::DaemonSet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Pod => "Pod",
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::ReplicaSet => "ReplicaSet",
            WorkloadKind::StatefulSet => "StatefulSet",
            WorkloadKind::DaemonSet => "DaemonSet",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkloadKind {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pod" => Ok(WorkloadKind::Pod),
            "Deployment" => Ok(WorkloadKind::Deployment),
            "ReplicaSet" => Ok(WorkloadKind::ReplicaSet),
            "StatefulSet" => Ok(WorkloadKind::StatefulSet),
            "DaemonSet" => Ok(WorkloadKind::DaemonSet),
            other => Err(ExtractError::UnsupportedKind(other.to_string())),
        }
    }
}

/// Extraction failures. Both deny, with different messages.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The declared kind is not one of [`WorkloadKind::ALL`]
    #[error("unsupported kind: {0:?}")]
    UnsupportedKind(String),

    /// The object could not be decoded as the declared kind
    #[error("failed to decode {kind}: {source}")]
    Decode {
        kind: WorkloadKind,
        #[source]
        source: serde_json::Error,
    },
}

/// Minimal view of a decoded workload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedWorkload {
    /// Namespace recorded on the object itself (often empty on CREATE)
    pub namespace: String,
    /// Annotations that will be present on the resulting Pods
    pub annotations: AnnotationSet,
}

/// Decode `raw` as `kind` and extract its pod annotations.
pub fn extract(kind: &str, raw: &[u8]) -> Result<ExtractedWorkload, ExtractError> {
    let kind: WorkloadKind = kind.parse()?;

    match kind {
        WorkloadKind::Pod => {
            let pod: Pod = decode(kind, raw)?;
            Ok(workload(pod.metadata.namespace, pod.metadata.annotations))
        }
        WorkloadKind::Deployment => {
            let deployment: Deployment = decode(kind, raw)?;
            let template = deployment.spec.map(|s| s.template);
            Ok(workload(deployment.metadata.namespace, template_annotations(template)))
        }
        WorkloadKind::ReplicaSet => {
            let replica_set: ReplicaSet = decode(kind, raw)?;
            let template = replica_set.spec.and_then(|s| s.template);
            Ok(workload(replica_set.metadata.namespace, template_annotations(template)))
        }
        WorkloadKind::StatefulSet => {
            let stateful_set: StatefulSet = decode(kind, raw)?;
            let template = stateful_set.spec.map(|s| s.template);
            Ok(workload(stateful_set.metadata.namespace, template_annotations(template)))
        }
        WorkloadKind::DaemonSet => {
            let daemon_set: DaemonSet = decode(kind, raw)?;
            let template = daemon_set.spec.map(|s| s.template);
            Ok(workload(daemon_set.metadata.namespace, template_annotations(template)))
        }
    }
}

fn decode<T: DeserializeOwned>(kind: WorkloadKind, raw: &[u8]) -> Result<T, ExtractError> {
    serde_json::from_slice(raw).map_err(|source| ExtractError::Decode { kind, source })
}

fn template_annotations(template: Option<PodTemplateSpec>) -> Option<AnnotationSet> {
    template.and_then(|t| t.metadata).and_then(|m| m.annotations)
}

fn workload(namespace: Option<String>, annotations: Option<AnnotationSet>) -> ExtractedWorkload {
    ExtractedWorkload {
        namespace: namespace.unwrap_or_default(),
        annotations: annotations.unwrap_or_default(),
    }
}
