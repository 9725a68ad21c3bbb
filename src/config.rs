//! Process configuration.
//!
//! Everything is read from the environment once at startup. Reading goes
//! through a lookup function so tests can supply their own variables.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::webhooks::policies::RequiredAnnotations;

/// Default path to webhook TLS certificate
pub const WEBHOOK_CERT_PATH: &str = "/etc/webhook/certs/tls.crt";
/// Default path to webhook TLS private key
pub const WEBHOOK_KEY_PATH: &str = "/etc/webhook/certs/tls.key";
/// Default webhook server port (unprivileged; the Service maps 443 to it)
pub const WEBHOOK_PORT: u16 = 8443;
/// Default validation endpoint path
pub const WEBHOOK_PATH: &str = "/validate";
/// Default health/metrics server port
pub const HEALTH_PORT: u16 = 8080;
/// Default upper bound on an admission request body (the API server's own limit)
pub const MAX_BODY_BYTES: usize = 3 * 1024 * 1024;

/// Configuration errors. All of them abort startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A variable is set but does not parse
    #[error("invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// An entry of the required annotation table is malformed
    #[error("invalid required annotation {entry:?}: {reason}")]
    InvalidAnnotation { entry: String, reason: String },

    /// The required annotation table ended up empty
    #[error("no required annotations configured")]
    NoRequiredAnnotations,
}

/// Runtime configuration for the webhook process.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub port: u16,
    pub path: String,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub health_port: u16,
    pub max_body_bytes: usize,
    pub required_annotations: RequiredAnnotations,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            port: WEBHOOK_PORT,
            path: WEBHOOK_PATH.to_string(),
            cert_path: PathBuf::from(WEBHOOK_CERT_PATH),
            key_path: PathBuf::from(WEBHOOK_KEY_PATH),
            health_port: HEALTH_PORT,
            max_body_bytes: MAX_BODY_BYTES,
            required_annotations: RequiredAnnotations::recommended(),
        }
    }
}

impl WebhookConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` to resolve variable names.
    ///
    /// Unset or blank variables fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let port = parse_or("WEBHOOK_PORT", get("WEBHOOK_PORT"), defaults.port)?;
        let health_port = parse_or("HEALTH_PORT", get("HEALTH_PORT"), defaults.health_port)?;
        let max_body_bytes = parse_or(
            "WEBHOOK_MAX_BODY_BYTES",
            get("WEBHOOK_MAX_BODY_BYTES"),
            defaults.max_body_bytes,
        )?;
        if max_body_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                name: "WEBHOOK_MAX_BODY_BYTES",
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let path = get("WEBHOOK_PATH").unwrap_or(defaults.path);
        if !path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                name: "WEBHOOK_PATH",
                value: path,
                reason: "must start with '/'".to_string(),
            });
        }

        let required_annotations = match get("REQUIRED_ANNOTATIONS") {
            Some(spec) => RequiredAnnotations::parse(&spec)?,
            None => defaults.required_annotations,
        };

        Ok(Self {
            port,
            path,
            cert_path: get("WEBHOOK_CERT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.cert_path),
            key_path: get("WEBHOOK_KEY_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.key_path),
            health_port,
            max_body_bytes,
            required_annotations,
        })
    }

    /// Address the TLS webhook listener binds to.
    pub fn webhook_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    /// Address the health server binds to.
    pub fn health_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.health_port))
    }

    /// Whether both halves of the TLS key pair exist on disk.
    pub fn tls_files_present(&self) -> bool {
        self.cert_path.exists() && self.key_path.exists()
    }
}

fn parse_or<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                name,
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}
