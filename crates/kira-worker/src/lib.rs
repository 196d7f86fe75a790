//! Worker runtime: polls the server for tasks, claims them, and dispatches
//! each to a task-type-specific executor (agent, planner, Jira, GitLab).
//!
//! - [`client`] — the server↔worker HTTP wire client.
//! - [`executor`] — the `AgentClient` abstraction over the model subprocess.
//! - [`agent_process`] — the production `AgentClient`, spawning the model CLI.
//! - [`executors`] — per-`TaskType` execution logic.
//! - [`memory`] — failure-pattern and rule-set context injected into prompts.
//! - [`runner`] — the poll/heartbeat loop tying everything together.
//! - [`workspace`] — resolves a board's working directory before a task runs.

pub mod agent_process;
pub mod client;
pub mod executor;
pub mod executors;
pub mod memory;
pub mod runner;
pub mod workspace;
