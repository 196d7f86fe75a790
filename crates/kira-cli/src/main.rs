//! Kira CLI -- run a worker in the foreground, or start/stop/check the
//! local agent daemon that bridges a browser tab to a worker runtime.
//!
//! Grounded on `original_source/src/kira/worker/cli.py`'s `start_worker`
//! (login, register, poll/heartbeat loop, Ctrl+C shutdown) and
//! `original_source/src/kira/agent/cli.py`'s `show_status`
//! (pidfile-based liveness check).

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kira_core::config::WorkerConfig;
use kira_core::lockfile::PidFile;
use kira_worker::agent_process::ProcessAgentClient;
use kira_worker::client::ServerClient;
use kira_worker::runner::WorkerRuntime;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Kira CLI -- orchestrate AI agents on a Kanban-style task board.
#[derive(Parser)]
#[command(name = "kira", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Worker process commands.
    Worker {
        #[command(subcommand)]
        command: WorkerCommands,
    },
    /// Local agent daemon commands.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommands,
    },
}

#[derive(Subcommand)]
enum WorkerCommands {
    /// Log in, register with the server, and poll for tasks until Ctrl+C.
    Start {
        /// Base URL of the Kira server (overrides `~/.kira/worker.yaml`).
        #[arg(short = 's', long)]
        server_url: Option<String>,
        /// Username to authenticate as.
        #[arg(short = 'u', long)]
        username: String,
        /// Password, if the server's auth mode requires one.
        #[arg(short = 'p', long)]
        password: Option<String>,
    },
}

#[derive(Subcommand)]
enum DaemonCommands {
    /// Start the local agent daemon in the foreground.
    Start,
    /// Stop a running local agent daemon.
    Stop,
    /// Show whether the local agent daemon is running.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    kira_telemetry::logging::init_logging("kira-cli", "info");

    let cli = Cli::parse();

    match cli.command {
        Commands::Worker { command } => match command {
            WorkerCommands::Start { server_url, username, password } => {
                start_worker(server_url, username, password).await?;
            }
        },
        Commands::Daemon { command } => match command {
            DaemonCommands::Start => daemon_start().await?,
            DaemonCommands::Stop => daemon_stop()?,
            DaemonCommands::Status => daemon_status(),
        },
    }

    Ok(())
}

async fn start_worker(server_url: Option<String>, username: String, password: Option<String>) -> Result<()> {
    let mut config = WorkerConfig::load().unwrap_or_default();
    if let Some(url) = server_url {
        config.server_url = url;
    }

    let login_client = ServerClient::new(config.server_url.clone(), None);
    println!("Connecting to {}...", config.server_url);
    let auth = login_client
        .login(&username, password.as_deref())
        .await
        .context("login failed")?;
    println!("Logged in as {username}");

    config.token = Some(auth.token);

    let agent_client: Arc<dyn kira_worker::executor::AgentClient> = Arc::new(ProcessAgentClient::new());
    let mut runtime = WorkerRuntime::new(config, agent_client, None);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::select! {
        result = runtime.start() => {
            result.context("worker runtime exited with error")?;
        }
        _ = ctrl_c => {
            println!("\nShutting down worker...");
            runtime.stop().await;
            println!("Worker stopped.");
        }
    }

    Ok(())
}

async fn daemon_start() -> Result<()> {
    let status = tokio::process::Command::new("kira-daemon")
        .status()
        .await
        .context("failed to launch kira-daemon (is it on PATH?)")?;
    if !status.success() {
        anyhow::bail!("kira-daemon exited with {status}");
    }
    Ok(())
}

fn daemon_stop() -> Result<()> {
    let path = PidFile::path();
    let pid: i32 = std::fs::read_to_string(&path)
        .context("no agent.pid file found; is the daemon running?")?
        .trim()
        .parse()
        .context("agent.pid does not contain a valid PID")?;

    #[cfg(unix)]
    {
        // SAFETY: pid is read from our own pidfile; SIGTERM requests a
        // graceful shutdown that releases the pidfile itself.
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc != 0 {
            anyhow::bail!("failed to signal daemon (pid={pid}): {}", std::io::Error::last_os_error());
        }
    }
    println!("Sent shutdown signal to daemon (pid={pid}).");
    Ok(())
}

fn daemon_status() {
    let path = PidFile::path();
    match std::fs::read_to_string(&path) {
        Ok(contents) => match contents.trim().parse::<i32>() {
            Ok(pid) => {
                #[cfg(unix)]
                let alive = unsafe { libc::kill(pid, 0) == 0 };
                #[cfg(not(unix))]
                let alive = true;

                if alive {
                    println!("Kira Agent: running (pid={pid})");
                } else {
                    println!("Kira Agent: not running (stale pidfile)");
                }
            }
            Err(_) => println!("Kira Agent: not running (invalid pidfile)"),
        },
        Err(_) => println!("Kira Agent: not running"),
    }
}
