//! The `kira-server` binary: boots the task store, background worker
//! staleness sweep, and the HTTP/WS API.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use kira_core::config::ServerConfig;
use kira_db::{workers, TaskStore};
use tracing::{info, warn};

use kira_server::routes::build_router;
use kira_server::state::ApiState;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    kira_telemetry::logging::init_logging("kira-server", "info");

    let config = ServerConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "failed to load server config, using defaults");
        ServerConfig::default()
    });

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create db directory")?;
    }
    let store = Arc::new(
        TaskStore::new(&config.db_path)
            .await
            .context("failed to open task store")?,
    );

    let state = Arc::new(ApiState::new(store.clone(), config.allowed_origins.clone()));

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            if let Err(e) = workers::sweep_stale_workers(&store).await {
                warn!(error = %e, "worker staleness sweep failed");
            }
        }
    });

    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "kira-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        return;
    }
    info!("ctrl-c received, shutting down");
}
