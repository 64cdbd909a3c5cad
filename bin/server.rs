// Metrics Reconciliation - Web Server
// REST API with Axum over one in-memory session

use anyhow::{Context, Result};
use clap::Parser;
use metrics_reconciliation::api::{create_router, AppState};
use metrics_reconciliation::{ReconConfig, ReconciliationSession};
use std::path::PathBuf;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "recon-server")]
#[command(about = "HTTP API for metrics reconciliation")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "RECON_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides [server] bind
    #[arg(short, long, env = "RECON_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "metrics_reconciliation=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = ReconConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;
    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());

    let session = ReconciliationSession::from_config(&config).context("Failed to set up session")?;
    let app = create_router(AppState::new(session));

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;

    info!("🚀 Metrics Reconciliation server on http://{}", bind);
    info!("📡 API endpoints:");
    info!("   GET  /api/health");
    info!("   GET  /api/table");
    info!("   POST /api/batches");
    info!("   GET  /api/cells/:metric/:year/:month");
    info!("   POST /api/selections");
    info!("   POST /api/projects/:id");
    info!("   GET  /api/export.csv");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
