//! `WorkerRuntime` lifecycle invariants reachable without a live server:
//! a freshly constructed runtime holds no worker id and no in-flight tasks,
//! and `stop()` is safe to call before `start()` ever runs.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use kira_core::config::WorkerConfig;
use kira_worker::executor::{AgentClient, AgentClientError, AgentRunOptions};
use kira_worker::runner::WorkerRuntime;

struct NullAgentClient;

#[async_trait]
impl AgentClient for NullAgentClient {
    async fn run(
        &self,
        _prompt: &str,
        _options: &AgentRunOptions,
    ) -> Result<BoxStream<'static, Result<String, AgentClientError>>, AgentClientError> {
        Ok(Box::pin(stream::empty()))
    }
}

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
async fn fresh_runtime_has_no_worker_id_and_no_running_tasks() {
    let agent_client: Arc<dyn AgentClient> = Arc::new(NullAgentClient);
    let runtime = WorkerRuntime::new(test_config(), agent_client, None);
    assert!(runtime.worker_id().await.is_none());
    assert_eq!(runtime.running_task_count().await, 0);
}

#[tokio::test]
async fn stop_before_start_does_not_hang_or_panic() {
    let agent_client: Arc<dyn AgentClient> = Arc::new(NullAgentClient);
    let runtime = WorkerRuntime::new(test_config(), agent_client, None);
    runtime.stop().await;
    assert_eq!(runtime.running_task_count().await, 0);
}

#[tokio::test]
async fn cloned_runtime_shares_the_same_task_bookkeeping() {
    let agent_client: Arc<dyn AgentClient> = Arc::new(NullAgentClient);
    let runtime = WorkerRuntime::new(test_config(), agent_client, None);
    let clone = runtime.clone();
    clone.stop().await;
    // `stop` flips a shared `AtomicBool`/drains a shared task map, so a
    // stop issued through a clone is visible through the original handle.
    assert_eq!(runtime.running_task_count().await, 0);
}
