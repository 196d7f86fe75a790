//! `ProcessAgentClient`: the production [`AgentClient`], spawning the model
//! CLI (`kiro-cli` in the original) as a subprocess and streaming its stdout
//! as chunks. The original's `KiraClient` (`kira.core.client`) is not part
//! of `original_source/worker/`, so only its contract is known (prompt in,
//! chunk stream out, timeout enforced) — the subprocess plumbing itself
//! follows `workspace.rs`'s `tokio::process::Command` usage.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::executor::{AgentClient, AgentClientError, AgentRunOptions};

/// Name of the model CLI binary, overridable so tests and alternate
/// installs don't need it on `PATH` as `kiro`.
const DEFAULT_BINARY: &str = "kiro";

pub struct ProcessAgentClient {
    binary: String,
}

impl ProcessAgentClient {
    pub fn new() -> Self {
        let binary = std::env::var("KIRA_AGENT_BINARY").unwrap_or_else(|_| DEFAULT_BINARY.to_string());
        Self { binary }
    }
}

impl Default for ProcessAgentClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentClient for ProcessAgentClient {
    async fn run(
        &self,
        prompt: &str,
        options: &AgentRunOptions,
    ) -> Result<BoxStream<'static, Result<String, AgentClientError>>, AgentClientError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--model").arg(&options.model);
        if let Some(skill) = &options.agent_skill {
            cmd.arg("--agent").arg(skill);
        }
        if options.trust_all_tools {
            cmd.arg("--trust-all-tools");
        }
        cmd.arg(prompt);
        if let Some(dir) = &options.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::null());

        let mut child = cmd.spawn().map_err(|e| AgentClientError::Io(e.to_string()))?;
        let stdout = child.stdout.take().ok_or(AgentClientError::ProcessDied)?;
        let timeout = Duration::from_secs(options.timeout_secs);

        let lines_stream = stream::unfold(
            (BufReader::new(stdout).lines(), child, timeout),
            |(mut lines, mut child, timeout)| async move {
                match tokio::time::timeout(timeout, lines.next_line()).await {
                    Ok(Ok(Some(line))) => Some((Ok(line), (lines, child, timeout))),
                    Ok(Ok(None)) => {
                        let _ = child.wait().await;
                        None
                    }
                    Ok(Err(e)) => Some((Err(AgentClientError::Io(e.to_string())), (lines, child, timeout))),
                    Err(_) => {
                        let _ = child.start_kill();
                        Some((Err(AgentClientError::Timeout(timeout.as_secs())), (lines, child, timeout)))
                    }
                }
            },
        );

        Ok(lines_stream.boxed())
    }
}
