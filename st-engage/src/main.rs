//! Engagement service (st-engage) - Main entry point
//!
//! Hosts the like/comment reconciliation engine behind an HTTP/SSE facade,
//! with a local SQLite fallback cache and background resynchronization
//! against the remote interaction service.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use st_engage::api::{self, AppState};
use st_engage::client::HttpInteractionApi;
use st_engage::{EngineConfig, InteractionEngine};

/// Command-line arguments for st-engage
#[derive(Parser, Debug)]
#[command(name = "st-engage")]
#[command(about = "Engagement (likes/comments) microservice for Sacral Track")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5810", env = "ST_ENGAGE_PORT")]
    port: u16,

    /// Base URL of the remote interaction service
    #[arg(short, long, env = "ST_REMOTE_URL")]
    remote_url: Option<String>,

    /// Folder holding the local interaction cache
    #[arg(short, long, env = "ST_DATA_FOLDER")]
    data_folder: Option<String>,

    /// Background resync period in seconds
    #[arg(long, default_value = "30", env = "ST_RESYNC_INTERVAL_SECS")]
    resync_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "st_engage=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let remote_url = st_common::config::resolve_remote_url(args.remote_url.as_deref())
        .context("Failed to resolve remote service URL")?;
    let data_folder =
        st_common::config::resolve_data_folder(args.data_folder.as_deref(), "ST_DATA_FOLDER");

    info!("Starting Sacral Track engagement service on port {}", args.port);
    info!("Remote service: {}", remote_url);
    info!("Data folder: {}", data_folder.display());

    std::fs::create_dir_all(&data_folder).context("Failed to create data folder")?;
    let cache = st_engage::db::open_cache(&data_folder.join("engage_cache.sqlite"))
        .await
        .context("Failed to open interaction cache")?;

    let remote = Arc::new(
        HttpInteractionApi::new(&remote_url).context("Failed to create remote client")?,
    );

    let config = EngineConfig {
        resync_interval: Duration::from_secs(args.resync_interval_secs),
        ..EngineConfig::default()
    };
    let engine = InteractionEngine::new(remote, Some(cache), config);
    engine.start_resync();
    info!("Reconciliation engine initialized");

    // Build the application router
    let app = api::create_router(AppState {
        engine: engine.clone(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    engine.stop_resync();
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
