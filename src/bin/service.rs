use std::net::SocketAddr;

use anyhow::{Context, Result};
use incident_reporter::{config::Config, create_router, AppState};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("FATAL ERROR: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let env_loaded = dotenvy::dotenv().is_ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "incident_reporter=info,incident_ingest=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("=== Incident Ingest Service Starting ===");
    if env_loaded {
        tracing::info!("Environment variables loaded from .env file");
    } else {
        tracing::info!("No .env file found, using system environment variables");
    }

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    tracing::info!("Server port: {}", config.port);
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!(
        "Public base URL: {}",
        config.public_base_url.as_deref().unwrap_or("(from request host)")
    );
    if let Some(dir) = &config.static_dir {
        tracing::info!("Serving frontend from {}", dir.display());
    }
    tracing::info!(
        "Upload limits: {} bytes per file, {} photos",
        config.max_file_bytes,
        config.max_photos
    );

    let state = AppState::new(config.clone());
    state
        .store
        .ensure_dirs()
        .await
        .with_context(|| format!("Failed to create data directories under {}", config.data_dir.display()))?;

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server running on http://localhost:{}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
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
            Ok(mut sig) => {
                sig.recv().await;
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
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, shutting down gracefully...");
        },
    }
}
