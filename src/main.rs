//! annotation-webhook - A validating admission webhook enforcing required pod annotations.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Loads configuration from the environment
//! - Starts the health server and the TLS webhook server
//! - Handles graceful shutdown

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::task::JoinError;
use tracing::{error, info};

use annotation_webhook::health::{HealthState, run_health_server};
use annotation_webhook::{WebhookConfig, run_webhook_server};

/// Grace period for in-flight admission reviews to complete during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("annotation_webhook=info".parse()?),
        )
        .json()
        .init();

    info!("Starting annotation-webhook");

    let config = WebhookConfig::from_env()?;
    info!(
        port = config.port,
        path = %config.path,
        health_port = config.health_port,
        required = config.required_annotations.len(),
        "Configuration loaded"
    );

    // TLS is mandatory; the key pair is provisioned before we start
    if !config.tls_files_present() {
        error!(
            cert_path = %config.cert_path.display(),
            key_path = %config.key_path.display(),
            "Webhook certificates not found"
        );
        return Err("webhook TLS certificate or key not found".into());
    }

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        return Err("failed to install rustls crypto provider".into());
    }

    let health_state = Arc::new(HealthState::new());

    // Start health server immediately so liveness works while TLS loads
    let health_handle = {
        let health_state = health_state.clone();
        let addr = config.health_addr();
        tokio::spawn(async move { run_health_server(health_state, addr).await })
    };

    let webhook_handle = {
        let health_state = health_state.clone();
        let config = config.clone();
        tokio::spawn(async move { run_webhook_server(&config, health_state).await })
    };

    // Wait for any task to complete (or fail), or shutdown signal
    tokio::select! {
        result = webhook_handle => {
            match result {
                Ok(Ok(())) => info!("Webhook server stopped"),
                Ok(Err(e)) => {
                    error!("Webhook server error: {}", e);
                    return Err(e.into());
                }
                Err(e) => error!("Webhook server task panicked: {}", e),
            }
        }
        // Losing the probes ends the process
        result = health_handle => {
            let e = health_exit_error(result);
            error!("Health server error: {}", e);
            return Err(e);
        }
        // Handle graceful shutdown on SIGTERM or SIGINT
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");

            // Mark as not ready so the endpoint is removed from the Service
            health_state.set_ready(false).await;
            info!("Marked webhook as not ready");

            info!(
                "Waiting {}s for in-flight admission reviews to complete...",
                SHUTDOWN_GRACE_PERIOD_SECS
            );
            tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)).await;

            info!("Grace period complete, shutting down");
        }
    }

    info!("Webhook stopped");
    Ok(())
}

/// Error for a health server task that returned, whatever its result.
fn health_exit_error(
    result: Result<Result<(), std::io::Error>, JoinError>,
) -> Box<dyn std::error::Error> {
    match result {
        Ok(Ok(())) => "health server stopped unexpectedly".into(),
        Ok(Err(e)) => e.into(),
        Err(e) => format!("health server task panicked: {e}").into(),
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the webhook cannot shut down
/// gracefully without them. Using expect() here is intentional.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
