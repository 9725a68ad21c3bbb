//! Required annotation policy.
//!
//! Validates:
//! - Every required annotation key is present on the pod metadata
//! - Every present value is accepted by the matcher registered for its key
//!
//! All failing keys are collected; evaluation never stops at the first one.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::config::ConfigError;

/// Annotations extracted from a workload object.
pub type AnnotationSet = BTreeMap<String, String>;

/// Keys enforced when no table is configured.
pub const DEFAULT_REQUIRED_ANNOTATIONS: &[&str] =
    &["app.kubernetes.io/name", "app.kubernetes.io/component"];

/// Predicate over an observed annotation value.
pub trait AnnotationMatcher: Send + Sync {
    /// Whether `value` satisfies this matcher.
    fn matches(&self, value: &str) -> bool;
}

impl<F> AnnotationMatcher for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn matches(&self, value: &str) -> bool {
        self(value)
    }
}

/// Presence-only check: any value is accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyValue;

impl AnnotationMatcher for AnyValue {
    fn matches(&self, _value: &str) -> bool {
        true
    }
}

/// Value must match the whole pattern.
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    /// Compile `pattern`, anchored so it must match the entire value.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(&format!("^(?:{})$", pattern)).map(Self)
    }
}

impl AnnotationMatcher for Pattern {
    fn matches(&self, value: &str) -> bool {
        self.0.is_match(value)
    }
}

/// Why a required key failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// The key is absent from the annotation set
    NotFound,
    /// The key is present but its matcher rejected the value
    Mismatch,
    /// The key is required but no matcher was configured for it
    Misconfigured,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::NotFound => write!(f, "key was not found"),
            Violation::Mismatch => write!(f, "value did not match"),
            Violation::Misconfigured => write!(f, "cannot validate with a missing matcher"),
        }
    }
}

/// Failing keys mapped to their violation. Empty means the policy passed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViolationSet(BTreeMap<String, Violation>);

impl ViolationSet {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<Violation> {
        self.0.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Violation)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// True when at least one key has no matcher configured.
    pub fn has_misconfiguration(&self) -> bool {
        self.0.values().any(|v| *v == Violation::Misconfigured)
    }

    fn record(&mut self, key: &str, violation: Violation) {
        self.0.insert(key.to_string(), violation);
    }
}

/// Renders as `{key: reason, key: reason}` in sorted key order.
impl fmt::Display for ViolationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, violation)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", key, violation)?;
        }
        write!(f, "}}")
    }
}

/// Required annotation keys and the matcher each value must satisfy.
///
/// Built once at startup and shared read-only between requests. A key
/// registered without a matcher is kept so evaluation can report it instead
/// of silently skipping it.
#[derive(Clone, Default)]
pub struct RequiredAnnotations {
    entries: BTreeMap<String, Option<Arc<dyn AnnotationMatcher>>>,
}

impl fmt::Debug for RequiredAnnotations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.entries
                    .iter()
                    .map(|(k, m)| (k, if m.is_some() { "matcher" } else { "<none>" })),
            )
            .finish()
    }
}

impl RequiredAnnotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` and check its value with `matcher`.
    pub fn require(
        mut self,
        key: impl Into<String>,
        matcher: impl AnnotationMatcher + 'static,
    ) -> Self {
        let matcher: Arc<dyn AnnotationMatcher> = Arc::new(matcher);
        self.entries.insert(key.into(), Some(matcher));
        self
    }

    /// Require `key` to be present with any value.
    pub fn require_present(self, key: impl Into<String>) -> Self {
        self.require(key, AnyValue)
    }

    /// Register `key` with an explicit, possibly absent, matcher.
    pub fn insert(&mut self, key: impl Into<String>, matcher: Option<Arc<dyn AnnotationMatcher>>) {
        self.entries.insert(key.into(), matcher);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Parse a comma-separated table of `key` or `key=<regex>` entries.
    ///
    /// A bare key is presence-only. Blank entries are skipped.
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let mut table = Self::new();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (key, pattern) = match entry.split_once('=') {
                Some((key, pattern)) => (key.trim(), Some(pattern.trim())),
                None => (entry, None),
            };

            if key.is_empty() {
                return Err(ConfigError::InvalidAnnotation {
                    entry: entry.to_string(),
                    reason: "empty key".to_string(),
                });
            }
            if table.entries.contains_key(key) {
                return Err(ConfigError::InvalidAnnotation {
                    entry: entry.to_string(),
                    reason: "duplicate key".to_string(),
                });
            }

            table = match pattern {
                None => table.require_present(key),
                Some("") => {
                    return Err(ConfigError::InvalidAnnotation {
                        entry: entry.to_string(),
                        reason: "empty pattern".to_string(),
                    });
                }
                Some(pattern) => {
                    let matcher =
                        Pattern::new(pattern).map_err(|e| ConfigError::InvalidAnnotation {
                            entry: entry.to_string(),
                            reason: e.to_string(),
                        })?;
                    table.require(key, matcher)
                }
            };
        }

        if table.is_empty() {
            return Err(ConfigError::NoRequiredAnnotations);
        }
        Ok(table)
    }

    /// The standard `app.kubernetes.io/name` + `app.kubernetes.io/component` table.
    pub fn recommended() -> Self {
        DEFAULT_REQUIRED_ANNOTATIONS
            .iter()
            .fold(Self::new(), |table, key| table.require_present(*key))
    }
}

/// Check `annotations` against every key in `table`.
pub fn evaluate(annotations: &AnnotationSet, table: &RequiredAnnotations) -> ViolationSet {
    let mut violations = ViolationSet::default();

    for (key, matcher) in &table.entries {
        let Some(matcher) = matcher else {
            violations.record(key, Violation::Misconfigured);
            continue;
        };

        match annotations.get(key) {
            None => violations.record(key, Violation::NotFound),
            Some(value) if !matcher.matches(value) => violations.record(key, Violation::Mismatch),
            Some(_) => {}
        }
    }

    violations
}
