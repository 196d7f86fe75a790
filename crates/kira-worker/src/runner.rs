//! Worker runtime (C6): polls for tasks, claims and dispatches them to the
//! per-type executors, and keeps the server informed via heartbeats. Direct
//! translation of `original_source/src/kira/worker/runner.py`'s
//! `WorkerRunner`, replacing `asyncio.gather`/`asyncio.Task.cancel` with
//! `tokio::select!`/`JoinHandle` + cooperative `Notify`-based cancellation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kira_core::config::WorkerConfig;
use kira_core::types::{Task, TaskType};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::client::{ServerClient, ServerError};
use crate::executor::AgentClient;
use crate::executors::agent::AgentExecutor;
use crate::executors::gitlab::GitLabExecutor;
use crate::executors::jira::JiraExecutor;
use crate::executors::planner::PlannerExecutor;
use crate::memory::failures::FailureLearning;
use crate::memory::rules::RulesManager;
use crate::workspace::WorkspaceResolver;

/// Reported to the server during registration.
pub const WORKER_VERSION: &str = "0.3.0";

struct TaskHandle {
    join: JoinHandle<()>,
    cancel: Arc<Notify>,
}

/// Ties together the HTTP client, the model subprocess abstraction, the
/// workspace resolver, and memory stores into the running worker process.
/// Cloning is cheap: every field is an `Arc` or `Copy`.
#[derive(Clone)]
pub struct WorkerRuntime {
    config: WorkerConfig,
    server: Arc<ServerClient>,
    agent_client: Arc<dyn AgentClient>,
    workspace: Arc<WorkspaceResolver>,
    failures: Option<Arc<FailureLearning>>,
    worker_id: Arc<Mutex<Option<Uuid>>>,
    running: Arc<AtomicBool>,
    tasks: Arc<Mutex<HashMap<Uuid, TaskHandle>>>,
}

impl WorkerRuntime {
    pub fn new(config: WorkerConfig, agent_client: Arc<dyn AgentClient>, failures: Option<Arc<FailureLearning>>) -> Self {
        let server = Arc::new(ServerClient::new(config.server_url.clone(), config.token.clone()));
        let workspace = Arc::new(WorkspaceResolver::new(config.workspace_root.clone()));
        Self {
            config,
            server,
            agent_client,
            workspace,
            failures,
            worker_id: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(true)),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registers with the server, applies server-provided config overrides,
    /// then runs the poll and heartbeat loops concurrently until [`Self::stop()`]
    /// is called.
    pub async fn start(&mut self) -> Result<(), ServerError> {
        let hostname = hostname();
        let capabilities = vec![
            "agent".to_string(),
            "jira".to_string(),
            "board_plan".to_string(),
            "card_gen".to_string(),
        ];
        let result = self.server.register_worker(&hostname, WORKER_VERSION, capabilities).await?;
        *self.worker_id.lock().await = Some(result.worker_id);

        if let Some(poll_interval) = result.poll_interval_seconds {
            self.config.poll_interval = poll_interval;
        }
        if let Some(max_concurrent) = result.max_concurrent_tasks {
            self.config.max_concurrent_tasks = max_concurrent;
        }

        info!(worker_id = %result.worker_id, hostname, "worker registered");

        tokio::select! {
            _ = self.poll_loop() => {}
            _ = self.heartbeat_loop() => {}
        }

        Ok(())
    }

    /// Stops the poll/heartbeat loops and aborts every in-flight task.
    /// Ungraceful: aborted tasks never get a chance to report `fail_task`
    /// themselves, so claimed/running rows are left for the server's
    /// staleness sweep to reconcile.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let mut tasks = self.tasks.lock().await;
        for (task_id, handle) in tasks.drain() {
            debug!(%task_id, "aborting task for shutdown");
            handle.join.abort();
        }
    }

    fn worker_id_blocking(&self) -> Option<Uuid> {
        self.worker_id.try_lock().ok().and_then(|g| *g)
    }

    /// The worker id assigned by the server's registration response, once
    /// [`Self::start()`] has completed registration. Exposed for the local
    /// agent daemon's status broadcasts, which mirror the original Python
    /// daemon's direct `self.runner.worker_id` attribute access.
    pub async fn worker_id(&self) -> Option<Uuid> {
        *self.worker_id.lock().await
    }

    /// Count of tasks currently claimed and running. See [`Self::worker_id`].
    pub async fn running_task_count(&self) -> usize {
        self.tasks.lock().await.len()
    }

    // -- poll loop ------------------------------------------------------

    async fn poll_loop(&self) {
        while self.running.load(Ordering::SeqCst) {
            self.cleanup_finished_tasks().await;

            let Some(worker_id) = *self.worker_id.lock().await else {
                break;
            };

            let capacity = {
                let tasks = self.tasks.lock().await;
                self.config.max_concurrent_tasks.saturating_sub(tasks.len())
            };

            if capacity > 0 {
                match self.server.poll_tasks(worker_id, capacity).await {
                    Ok(tasks) => {
                        for task in tasks {
                            let mut guard = self.tasks.lock().await;
                            if let std::collections::hash_map::Entry::Vacant(e) = guard.entry(task.id) {
                                let handle = self.spawn_task(worker_id, task);
                                e.insert(handle);
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "poll failed"),
                }
            }

            tokio::time::sleep(poll_duration(self.config.poll_interval)).await;
        }
    }

    async fn cleanup_finished_tasks(&self) {
        let mut guard = self.tasks.lock().await;
        let finished: Vec<Uuid> = guard
            .iter()
            .filter(|(_, h)| h.join.is_finished())
            .map(|(id, _)| *id)
            .collect();
        for task_id in finished {
            if let Some(handle) = guard.remove(&task_id) {
                if let Err(e) = handle.join.await {
                    if e.is_panic() {
                        error!(%task_id, "task panicked");
                    }
                }
            }
        }
    }

    fn spawn_task(&self, worker_id: Uuid, task: Task) -> TaskHandle {
        let cancel = Arc::new(Notify::new());
        let runtime = self.clone();
        let cancel_for_task = cancel.clone();
        let join = tokio::spawn(async move {
            runtime.execute_task(worker_id, task, cancel_for_task).await;
        });
        TaskHandle { join, cancel }
    }

    // -- task execution ---------------------------------------------------

    async fn execute_task(&self, worker_id: Uuid, task: Task, cancel: Arc<Notify>) {
        let task_id = task.id;

        match self.server.claim_task(task_id, worker_id).await {
            Ok(task) => {
                info!(%task_id, task_type = ?task.task_type, "claimed task");
                tokio::select! {
                    _ = self.dispatch(worker_id, &task) => {}
                    _ = cancel.notified() => {
                        info!(%task_id, "task cancelled");
                        let _ = self
                            .server
                            .fail_task(task_id, worker_id, "Task cancelled by worker".to_string(), None)
                            .await;
                    }
                }
            }
            Err(ServerError::Conflict) => {
                debug!(%task_id, "task already claimed, skipping");
            }
            Err(e) => {
                warn!(%task_id, error = %e, "failed to claim task");
            }
        }
    }

    async fn dispatch(&self, worker_id: Uuid, task: &Task) {
        // Jira tasks never touch a git working directory; resolving one
        // would be a wasted `get_board_settings` round trip (original's
        // `_run_jira` never calls `_resolve_workspace` either).
        let needs_workspace = !matches!(
            task.task_type,
            TaskType::JiraImport | TaskType::JiraPush | TaskType::JiraSync
        );
        let working_dir = if needs_workspace {
            self.resolve_workspace(task.board_id).await
        } else {
            None
        };

        match task.task_type {
            TaskType::AgentRun => {
                let mut executor = AgentExecutor::new(
                    self.server.clone(),
                    worker_id,
                    self.agent_client.clone(),
                    self.config.kiro_timeout,
                );
                if let Some(failures) = &self.failures {
                    let rules = Arc::new(Mutex::new(RulesManager::new(
                        working_dir.clone().unwrap_or_else(|| self.config.workspace_root.clone()),
                    )));
                    executor = executor.with_memory(failures.clone(), rules);
                }
                executor.execute(task, working_dir).await;
            }
            TaskType::BoardPlan | TaskType::CardGen => {
                let executor = PlannerExecutor::new(
                    self.server.clone(),
                    worker_id,
                    self.agent_client.clone(),
                    self.config.kiro_timeout,
                );
                executor.execute(task, working_dir).await;
            }
            TaskType::JiraImport | TaskType::JiraPush | TaskType::JiraSync => {
                let executor = JiraExecutor::new(&self.server, worker_id);
                executor.execute(task).await;
            }
            TaskType::GitlabCreateProject | TaskType::GitlabPush => {
                let executor = GitLabExecutor::new(&self.server, worker_id);
                executor.execute(task, working_dir.as_deref()).await;
            }
            TaskType::Unknown => {
                let _ = self
                    .server
                    .fail_task(task.id, worker_id, "Unknown task type".to_string(), None)
                    .await;
            }
        }
    }

    async fn resolve_workspace(&self, board_id: Uuid) -> Option<std::path::PathBuf> {
        let settings = self.server.get_board_settings(board_id).await.ok()?;
        self.workspace.resolve(Some(&settings)).await
    }

    // -- heartbeat loop ---------------------------------------------------

    async fn heartbeat_loop(&self) {
        while self.running.load(Ordering::SeqCst) {
            let Some(worker_id) = *self.worker_id.lock().await else {
                break;
            };

            let running_ids: Vec<Uuid> = self.tasks.lock().await.keys().copied().collect();

            match self.server.heartbeat(worker_id, running_ids, system_load()).await {
                Ok(result) => {
                    for task_id in &result.directives.cancel_task_ids {
                        if let Some(handle) = self.tasks.lock().await.get(task_id) {
                            info!(%task_id, "server requested cancellation");
                            handle.cancel.notify_one();
                        }
                    }
                }
                Err(e) => warn!(error = %e, "heartbeat failed"),
            }

            tokio::time::sleep(poll_duration(self.config.heartbeat_interval)).await;
        }
    }
}

fn hostname() -> String {
    hostname_impl()
}

#[cfg(unix)]
fn hostname_impl() -> String {
    nix_hostname().unwrap_or_else(|| "unknown-host".to_string())
}

#[cfg(not(unix))]
fn hostname_impl() -> String {
    "unknown-host".to_string()
}

#[cfg(unix)]
fn nix_hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    // SAFETY: gethostname writes a NUL-terminated string into `buf` and
    // returns 0 on success; `buf` is sized well above POSIX's HOST_NAME_MAX.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return None;
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Some(String::from_utf8_lossy(&buf[..len]).into_owned())
}

/// No `sysinfo`/`libc::getloadavg` dependency in this crate's stack; reports
/// a fixed zero load rather than pulling in a new crate for one optional
/// heartbeat field the server doesn't presently act on.
fn system_load() -> f64 {
    0.0
}

fn poll_duration(secs: f64) -> std::time::Duration {
    std::time::Duration::from_secs_f64(secs.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::test_support::StubAgentClient;

    fn test_config() -> WorkerConfig {
        WorkerConfig {
            server_url: "http://127.0.0.1:1".to_string(),
            token: None,
            password: None,
            poll_interval: 0.01,
            heartbeat_interval: 0.01,
            max_concurrent_tasks: 2,
            kiro_timeout: 5,
            workspace_root: std::env::temp_dir(),
        }
    }

    #[tokio::test]
    async fn new_runtime_starts_with_no_worker_id() {
        let agent_client: Arc<dyn AgentClient> = Arc::new(StubAgentClient { chunks: vec![] });
        let runtime = WorkerRuntime::new(test_config(), agent_client, None);
        assert!(runtime.worker_id_blocking().is_none());
    }

    #[tokio::test]
    async fn stop_before_start_is_a_noop() {
        let agent_client: Arc<dyn AgentClient> = Arc::new(StubAgentClient { chunks: vec![] });
        let runtime = WorkerRuntime::new(test_config(), agent_client, None);
        runtime.stop().await;
        assert!(!runtime.running.load(Ordering::SeqCst));
    }
}
