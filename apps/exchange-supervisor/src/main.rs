//! Exchange Supervisor Binary
//!
//! Starts the session supervisor with the sandbox connector, the in-memory
//! order store, and the broadcast event sink.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin exchange-supervisor
//! ```
//!
//! # Environment Variables
//!
//! All optional:
//! - `SUPERVISOR_TENANTS`: Comma-separated tenant ids to register at boot
//! - `SUPERVISOR_MAX_ATTEMPTS`: Retry ceiling per call (default: 5)
//! - `SUPERVISOR_RETRY_MIN_TIMEOUT_MS`: First retry delay (default: 500)
//! - `SUPERVISOR_RETRY_FACTOR`: Retry delay multiplier (default: 1.2)
//! - `SUPERVISOR_BASE_TIMEOUT_MS`: Reconnect backoff unit (default: 5000)
//! - `SUPERVISOR_RECONCILE_INTERVAL_MS`: Reconciliation period (default: 60000)
//! - `SUPERVISOR_HEALTH_CHECK_INTERVAL_MS`: Health-check period (default: 15000)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;

use exchange_supervisor::infrastructure::events::ChannelEventSink;
use exchange_supervisor::infrastructure::persistence::InMemoryOrderStore;
use exchange_supervisor::infrastructure::sandbox::SandboxConnectorFactory;
use exchange_supervisor::{Credentials, SessionRegistry, SupervisorConfig, TenantId, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    telemetry::init();

    tracing::info!("Starting Exchange Supervisor");

    let config = SupervisorConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let store = Arc::new(InMemoryOrderStore::new());
    let events = Arc::new(ChannelEventSink::default());
    let registry = Arc::new(SessionRegistry::new(
        SandboxConnectorFactory::new(),
        store,
        Arc::clone(&events),
        config,
    ));

    // Log supervisor events; downstream consumers would subscribe here.
    let mut event_rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = event_rx.recv().await {
            tracing::debug!(?event, "supervisor event");
        }
    });

    for tenant in bootstrap_tenants() {
        let credentials = Credentials::new("sandbox", "sandbox");
        if let Err(error) = registry.add_or_replace(tenant.clone(), credentials).await {
            tracing::error!(tenant = %tenant, error = %error, "failed to register tenant");
        }
    }

    tracing::info!("Supervisor ready");

    await_shutdown(shutdown_token).await;

    registry.shutdown().await;
    tracing::info!("Supervisor stopped");
    Ok(())
}

/// Tenants to register at boot, from `SUPERVISOR_TENANTS`.
fn bootstrap_tenants() -> Vec<TenantId> {
    std::env::var("SUPERVISOR_TENANTS")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(TenantId::new)
                .collect()
        })
        .unwrap_or_default()
}

/// Log the parsed configuration.
fn log_config(config: &SupervisorConfig) {
    tracing::info!(
        max_attempts = config.retry.max_attempts,
        retry_min_timeout_ms = config.retry.min_timeout.as_millis(),
        retry_factor = config.retry.factor,
        base_timeout_ms = config.connection.base_timeout.as_millis(),
        reconcile_interval_ms = config.connection.reconciliation_interval.as_millis(),
        health_check_interval_ms = config.connection.health_check_interval.as_millis(),
        "Configuration loaded"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
