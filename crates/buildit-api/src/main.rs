//! BuildIt API Server

use anyhow::Context;
use buildit_api::{AppState, routes};
use buildit_config::{LogFormat, SystemConfig, load_system_config};
use buildit_scheduler::{Dispatcher, MemoryPipelineStore};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::var("BUILDIT_CONFIG") {
        Ok(path) => load_system_config(&path)
            .with_context(|| format!("Failed to load server config from {}", path))?,
        Err(_) => SystemConfig::default(),
    };

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.server.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    let store = Arc::new(MemoryPipelineStore::new());
    let dispatcher = Arc::new(Dispatcher::new(store, config.server.event_capacity));
    dispatcher
        .recover()
        .await
        .context("Failed to recover pipelines")?;

    let state = AppState::new(dispatcher);

    // Build router
    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Start server
    let addr = config.server.listen;
    info!("Starting server on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
