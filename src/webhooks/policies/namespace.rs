//! Namespace exemption.
//!
//! Objects in control-plane-owned namespaces are admitted without decoding
//! or evaluation; platform components may legitimately omit the annotations.

/// Reserved namespaces managed by the cluster itself.
pub const EXEMPT_NAMESPACES: &[&str] = &["kube-system", "kube-public"];

/// Whether `namespace` is owned by the control plane.
pub fn is_exempt(namespace: &str) -> bool {
    EXEMPT_NAMESPACES.contains(&namespace)
}
