//! phd-rd - result data service entry point

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use phd_common::events::EventBus;
use phd_common::SystemClock;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use phd_rd::config::{Args, ServiceConfig};
use phd_rd::consumer::{spawn_consumer, INGEST_QUEUE_CAPACITY};
use phd_rd::services::{MetadataClients, ResultServices};
use phd_rd::{build_router, db, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = ServiceConfig::resolve(args).context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("phd_rd={0},phd_common={0},tower_http=info", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting phd-rd v{}", env!("CARGO_PKG_VERSION"));
    config.log_summary();

    let pool = db::init_database_pool(&config.database_path)
        .await
        .context("Failed to initialize database")?;
    info!("✓ Database ready");

    let metadata = MetadataClients::from_urls(
        config.plate_service_url.as_deref(),
        config.protocol_service_url.as_deref(),
        config.metadata_timeout,
    )
    .context("Failed to build metadata clients")?;

    let events = EventBus::new(config.event_bus_capacity);
    let services = ResultServices::new(pool, Arc::new(SystemClock), events, metadata);

    let (ingest_tx, ingest_rx) = mpsc::channel(INGEST_QUEUE_CAPACITY);
    let consumer = spawn_consumer(services.clone(), ingest_rx);

    let app = build_router(AppState::new(services, ingest_tx));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!("phd-rd listening on http://{}", config.bind_addr);
    info!("Health check: http://{}/health", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // The router (and its sender) is gone; let the consumer drain
    consumer.await.context("Ingest consumer panicked")?;
    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
