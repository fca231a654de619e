//! delayq API server entry point.

use std::time::Duration;

use delayq_api::config::AppConfig;
use delayq_api::error::AppError;
use delayq_api::state::AppState;
use delayq_core::queue_type::QueueTypeRegistry;
use delayq_core::signal::{ShutdownSignal, SignalGate};
use delayq_store::pg_payload_store::PgPayloadStore;
use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

/// How often expired payloads are swept from the payload collection.
const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> Result<(), AppError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting delayq API server");

    let config = AppConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("../../migrations").run(&pool).await?;

    let payloads = PgPayloadStore::new(pool.clone(), config.payload_collection.clone())?;
    let app_state = AppState::postgres(
        pool,
        payloads.clone(),
        QueueTypeRegistry::default_registry(),
    )
    .with_payload_ttl(config.payload_ttl);

    let gate = SignalGate::new();
    tokio::spawn(forward_signals(gate.clone()));
    tokio::spawn(purge_expired_payloads(payloads, gate.clone()));

    let app = delayq_api::app(app_state).layer(TraceLayer::new_for_http());

    let addr = config.listen_addr()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let signal = gate.wait().await;
            tracing::info!(%signal, "shutting down");
        })
        .await?;

    Ok(())
}

/// Feeds process signals into the gate for as long as the server runs.
#[cfg(unix)]
async fn forward_signals(gate: SignalGate) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGTERM handler");
            return;
        }
    };
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "failed to listen for SIGINT");
                    return;
                }
                gate.request(ShutdownSignal::Interrupt);
            }
            _ = sigterm.recv() => gate.request(ShutdownSignal::Terminate),
        }
    }
}

/// Feeds CTRL+C into the gate for as long as the server runs.
#[cfg(not(unix))]
async fn forward_signals(gate: SignalGate) {
    loop {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for CTRL+C");
            return;
        }
        gate.request(ShutdownSignal::Interrupt);
    }
}

/// Periodically deletes expired payloads until shutdown is requested.
async fn purge_expired_payloads(payloads: PgPayloadStore, gate: SignalGate) {
    let mut ticker = tokio::time::interval(PURGE_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = payloads.purge_expired().await {
                    tracing::warn!(error = %e, "payload purge failed");
                }
            }
            _ = gate.wait() => return,
        }
    }
}
