//! Abstraction over the model subprocess (`kiro-cli` in the original), so the
//! Agent and Planner Executors never depend on a concrete process-spawning
//! implementation. Follows the shape of a `PtySpawner`-style trait
//! (`#[async_trait::async_trait]`, one spawn-and-stream entry point) — a
//! process-spawning abstraction there, a prompt-to-chunk-stream abstraction
//! here, treating the model subprocess as an opaque stream producer.

use futures_util::stream::BoxStream;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentClientError {
    #[error("agent process exited unexpectedly")]
    ProcessDied,
    #[error("agent timed out after {0}s")]
    Timeout(u64),
    #[error("agent io error: {0}")]
    Io(String),
}

/// One invocation's worth of settings, mirroring the constructor arguments
/// of the original's `KiraClient`.
#[derive(Debug, Clone, Default)]
pub struct AgentRunOptions {
    pub agent_skill: Option<String>,
    pub model: String,
    pub trust_all_tools: bool,
    pub timeout_secs: u64,
    pub working_dir: Option<PathBuf>,
}

/// Abstraction over the model subprocess so it can be mocked in tests.
#[async_trait::async_trait]
pub trait AgentClient: Send + Sync {
    async fn run(
        &self,
        prompt: &str,
        options: &AgentRunOptions,
    ) -> Result<BoxStream<'static, Result<String, AgentClientError>>, AgentClientError>;
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use futures_util::stream;

    /// An `AgentClient` that replays a fixed chunk sequence, used by the
    /// Agent/Planner Executor tests so they never shell out to a real model.
    pub struct StubAgentClient {
        pub chunks: Vec<String>,
    }

    #[async_trait::async_trait]
    impl AgentClient for StubAgentClient {
        async fn run(
            &self,
            _prompt: &str,
            _options: &AgentRunOptions,
        ) -> Result<BoxStream<'static, Result<String, AgentClientError>>, AgentClientError> {
            let chunks: Vec<Result<String, AgentClientError>> =
                self.chunks.iter().cloned().map(Ok).collect();
            Ok(Box::pin(stream::iter(chunks)))
        }
    }
}
