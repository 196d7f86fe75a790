use std::time::Duration;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use kira_core::lockfile::PidFile;
use tracing::info;

use kira_daemon::daemon::AgentDaemon;
use kira_daemon::session::daemon_ws;

const DEFAULT_PORT: u16 = 9820;
const GRACE_PERIOD_SECS: f64 = 3.0;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    kira_telemetry::logging::init_logging("kira-daemon", "info");

    let pidfile = PidFile::acquire().map_err(anyhow::Error::msg)?;

    let port: u16 = std::env::var("KIRA_AGENT_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let daemon = AgentDaemon::new(Duration::from_secs_f64(GRACE_PERIOD_SECS));

    let app = Router::new().route("/", get(daemon_ws)).with_state(daemon);

    let addr = format!("127.0.0.1:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "kira-daemon listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("daemon server error")?;

    pidfile.release();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        return;
    }
    info!("ctrl-c received, shutting down");
}
