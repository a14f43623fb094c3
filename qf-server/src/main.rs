//! qf-server - QuestionFlow live classroom service
//!
//! Serves the session, doubt and confusion REST API plus the realtime
//! WebSocket and SSE transports for session rooms.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use qf_common::config::{CliOverrides, ServerConfig};
use qf_common::db::init_database;
use qf_server::{build_router, AppState};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for qf-server
#[derive(Parser, Debug)]
#[command(name = "qf-server")]
#[command(about = "QuestionFlow live classroom question and confusion service")]
#[command(version)]
struct Args {
    /// TOML config file (must exist; falls back to QF_CONFIG when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// SQLite database file
    #[arg(short, long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ServerConfig::resolve(&CliOverrides {
        config: args.config,
        host: args.host,
        port: args.port,
        database: args.database,
    })
    .context("Failed to resolve configuration")?;

    // RUST_LOG wins over the configured level
    let level = &config.log_level;
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!("qf_server={level},qf_common={level},tower_http={level}").into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting QuestionFlow server (qf-server) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!(
        "Duplicate matching: {:?} (threshold {}), confusion window {}s",
        config.match_policy,
        config.similarity_threshold,
        config.confusion_window.as_secs()
    );

    info!("Database path: {}", config.database_path.display());
    let pool = init_database(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    let bind_addr = config.bind_addr();
    let state = AppState::new(pool, config)
        .await
        .context("Failed to initialize services")?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    info!("qf-server listening on http://{}", bind_addr);
    info!("Health check: http://{}/health", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

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
