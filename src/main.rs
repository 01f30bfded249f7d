use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use clap::Parser;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber;

use floodgate::config::{FloodgateConfig, StoreBackend};
use floodgate::http::{rate_limit, RateLimitGate};
use floodgate::store::{KeyValueStore, MemoryStore, RedisStore};

/// Rate-limiting server for exercising a floodgate configuration end to
/// end: every route answers 200 once it clears the gate.
#[derive(Parser)]
#[command(name = "floodgate", version)]
struct Args {
    /// Path to the YAML configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    info!("Starting Floodgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // A malformed configuration is fatal here, at startup; nothing about
    // configuration can fail mid-request.
    let config = match &args.config {
        Some(path) => FloodgateConfig::from_file(path)?,
        None => FloodgateConfig::default(),
    };
    info!(
        listen_addr = %config.listen_addr,
        routes = config.routes.len(),
        enabled = config.enabled,
        "Configuration loaded"
    );

    let store: Arc<dyn KeyValueStore> = match config.store.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Redis => {
            let url = config
                .store
                .url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("store.url is required for the redis backend"))?;
            Arc::new(RedisStore::connect(url).await?)
        }
    };
    info!(backend = ?config.store.backend, "Store initialized");

    let gate = RateLimitGate::new(&config, store);

    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .fallback(|| async { "ok" })
        .layer(axum::middleware::from_fn_with_state(gate, rate_limit));

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!("Listening on {}", config.listen_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Floodgate stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
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
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
