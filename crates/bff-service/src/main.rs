//! Team/Task BFF
//!
//! # Startup
//!
//! 1. Initialize tracing
//! 2. Load configuration
//! 3. Install the Prometheus metrics recorder
//! 4. Fetch the verification key set (fatal on failure)
//! 5. Build application state and spawn the key refresher
//! 6. Serve until SIGINT/SIGTERM, then stop background tasks and drain

use bff_service::auth::jwks::KeySetCache;
use bff_service::config::Config;
use bff_service::observability::metrics::init_metrics_recorder;
use bff_service::routes::{self, AppState};
use bff_service::tasks::start_jwks_refresher;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_DRAIN: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bff_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting BFF service");

    let config = Config::from_env().map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;
    let drain = drain_period();

    info!(
        bind_address = %config.bind_address,
        jwks_url = %config.jwks_url,
        issuer = %config.token_issuer,
        audience = %config.token_audience,
        allowed_algorithms = ?config.allowed_algorithms,
        fanout_concurrency = config.fanout_concurrency,
        request_timeout_seconds = config.request_timeout_seconds,
        drain_seconds = drain.as_secs(),
        "Configuration loaded"
    );

    // Must happen before any metrics are recorded
    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;

    // No keys means no request can ever be authenticated
    let key_set = KeySetCache::initialize(config.key_set_config())
        .await
        .map(Arc::new)
        .map_err(|e| {
            error!(error = %e, jwks_url = %config.jwks_url, "Failed to fetch initial verification keys");
            e
        })?;

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!(bind_address = %config.bind_address, error = %e, "Invalid bind address");
        e
    })?;

    let state = Arc::new(AppState::new(config, Arc::clone(&key_set))?);

    let shutdown_token = CancellationToken::new();
    let refresher = tokio::spawn(start_jwks_refresher(
        Arc::clone(&key_set),
        shutdown_token.child_token(),
    ));

    let app = routes::build_routes(state, metrics_handle);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "BFF service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_token.clone(), drain))
        .await?;

    // Also covers a serve error that skipped the signal path
    shutdown_token.cancel();
    if let Err(e) = refresher.await {
        warn!(error = %e, "JWKS refresher task did not exit cleanly");
    }

    info!("BFF service shutdown complete");
    Ok(())
}

/// `BFF_DRAIN_SECONDS`, falling back to the default on absence or garbage.
fn drain_period() -> Duration {
    match std::env::var("BFF_DRAIN_SECONDS") {
        Ok(raw) => raw.trim().parse::<u64>().map(Duration::from_secs).unwrap_or_else(|e| {
            warn!(value = %raw, error = %e, "Ignoring invalid BFF_DRAIN_SECONDS");
            DEFAULT_DRAIN
        }),
        Err(_) => DEFAULT_DRAIN,
    }
}

/// Resolves once SIGINT or SIGTERM arrives, naming the signal.
async fn wait_for_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => "SIGINT",
        () = terminate => "SIGTERM",
    }
}

/// Stop background work as soon as a signal arrives, then hold the listener
/// open for `drain` so in-flight requests can finish.
async fn shutdown_signal(shutdown_token: CancellationToken, drain: Duration) {
    let signal = wait_for_signal().await;
    info!(signal, "Shutdown signal received");

    shutdown_token.cancel();

    if drain.is_zero() {
        info!("Skipping drain period");
        return;
    }

    warn!(drain_seconds = drain.as_secs(), "Draining connections");
    tokio::time::sleep(drain).await;
    info!("Drain period complete");
}
