//! Executes `agent_run` tasks, direct translation of
//! `original_source/src/kira/worker/executors/agent.py`'s `AgentExecutor`.

use crate::client::ServerClient;
use crate::executor::{AgentClient, AgentClientError, AgentRunOptions};
use crate::memory::{failures::FailureLearning, rules::RulesManager};
use futures_util::StreamExt;
use kira_core::types::Task;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Report progress every N chunks to avoid flooding the server.
pub const PROGRESS_REPORT_INTERVAL: usize = 20;

pub struct AgentExecutor {
    server: Arc<ServerClient>,
    worker_id: Uuid,
    agent_client: Arc<dyn AgentClient>,
    failures: Option<Arc<FailureLearning>>,
    rules: Option<Arc<tokio::sync::Mutex<RulesManager>>>,
    kiro_timeout_secs: u64,
}

impl AgentExecutor {
    pub fn new(
        server: Arc<ServerClient>,
        worker_id: Uuid,
        agent_client: Arc<dyn AgentClient>,
        kiro_timeout_secs: u64,
    ) -> Self {
        Self {
            server,
            worker_id,
            agent_client,
            failures: None,
            rules: None,
            kiro_timeout_secs,
        }
    }

    pub fn with_memory(
        mut self,
        failures: Arc<FailureLearning>,
        rules: Arc<tokio::sync::Mutex<RulesManager>>,
    ) -> Self {
        self.failures = Some(failures);
        self.rules = Some(rules);
        self
    }

    pub async fn execute(&self, task: &Task, working_dir: Option<PathBuf>) {
        let agent_type = task.agent_type.as_deref().unwrap_or("general");
        let prompt_text = match &task.prompt_text {
            Some(p) if !p.is_empty() => p.clone(),
            _ => {
                let _ = self
                    .server
                    .fail_task(task.id, self.worker_id, "Task has no prompt_text".to_string(), None)
                    .await;
                return;
            }
        };

        let assembled_prompt = self.assemble_prompt(&prompt_text).await;

        let mut output_chunks: Vec<String> = Vec::new();

        self.report_progress(task.id, format!("Starting {agent_type} agent...")).await;

        let options = AgentRunOptions {
            agent_skill: task.agent_skill.clone(),
            model: task.agent_model.clone().unwrap_or_else(|| "smart".to_string()),
            trust_all_tools: true,
            timeout_secs: self.kiro_timeout_secs,
            working_dir,
        };

        let stream = match self.agent_client.run(&assembled_prompt, &options).await {
            Ok(stream) => stream,
            Err(e) => {
                self.fail(task.id, agent_type, &e.to_string(), "").await;
                return;
            }
        };

        tokio::pin!(stream);
        let mut chunk_count = 0usize;
        let mut failed: Option<AgentClientError> = None;

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(text) => {
                    output_chunks.push(text);
                    chunk_count += 1;
                    if chunk_count % PROGRESS_REPORT_INTERVAL == 0 {
                        self.report_progress(
                            task.id,
                            format!("Running {agent_type}... ({chunk_count} chunks)"),
                        )
                        .await;
                    }
                }
                Err(e) => {
                    failed = Some(e);
                    break;
                }
            }
        }

        let output = output_chunks.join("");

        if let Some(e) = failed {
            self.fail(task.id, agent_type, &e.to_string(), &output).await;
            return;
        }

        info!(task_id = %task.id, agent_type, output_len = output.len(), "task completed");
        if let Err(e) = self
            .server
            .complete_task(task.id, self.worker_id, Some(output), None)
            .await
        {
            error!(task_id = %task.id, error = %e, "failed to report completion");
        }
    }

    async fn assemble_prompt(&self, prompt_text: &str) -> String {
        let mut rules_context = String::new();
        if let Some(rules) = &self.rules {
            let mut manager = rules.lock().await;
            rules_context = manager.get_context(prompt_text, 3);
        }

        let mut failure_context = String::new();
        if let Some(failures) = &self.failures {
            failure_context = failures
                .get_context_string(prompt_text.to_string(), Vec::new(), 3)
                .await
                .unwrap_or_default();
        }

        format!("{rules_context}{failure_context}{prompt_text}")
    }

    async fn fail(&self, task_id: Uuid, agent_type: &str, error_msg: &str, partial_output: &str) {
        error!(task_id = %task_id, agent_type, error = error_msg, "task failed");
        let output = if partial_output.is_empty() { None } else { Some(partial_output.to_string()) };
        let _ = self
            .server
            .fail_task(task_id, self.worker_id, error_msg.to_string(), output)
            .await;
    }

    async fn report_progress(&self, task_id: Uuid, text: String) {
        if let Err(e) = self
            .server
            .report_progress(task_id, self.worker_id, Some(text), None, None, None)
            .await
        {
            tracing::debug!(task_id = %task_id, error = %e, "progress report failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::test_support::StubAgentClient;
    use kira_core::types::{TaskPayload, TaskType};

    fn sample_task(prompt: Option<&str>) -> Task {
        let mut task = Task::new(Uuid::new_v4(), TaskType::AgentRun, TaskPayload::AgentRun);
        task.agent_type = Some("coder".to_string());
        task.prompt_text = prompt.map(str::to_string);
        task
    }

    #[tokio::test]
    async fn prompt_assembly_concatenates_rules_then_failures_then_prompt() {
        let server = Arc::new(ServerClient::new("http://localhost:1", None));
        let agent_client: Arc<dyn AgentClient> =
            Arc::new(StubAgentClient { chunks: vec!["done".to_string()] });
        let executor = AgentExecutor::new(server, Uuid::new_v4(), agent_client, 600);
        let assembled = executor.assemble_prompt("fix the bug").await;
        assert_eq!(assembled, "fix the bug");
    }

    #[test]
    fn missing_prompt_task_has_no_prompt_text() {
        let task = sample_task(None);
        assert!(task.prompt_text.is_none());
    }
}
