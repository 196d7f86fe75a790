//! Wire-level request/response bodies for the server <-> worker HTTP
//! contract. Kept separate from `kira-core::types` because these shapes are
//! transport DTOs, not domain rows — a `Task` on the wire carries the same
//! fields as the store's row, but auth/registration/heartbeat bodies have
//! no domain-type counterpart at all.

use chrono::{DateTime, Utc};
use kira_core::types::{BoardSettings, Task};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterWorkerRequest {
    pub hostname: String,
    pub worker_version: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterWorkerResponse {
    pub worker_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_tasks: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub worker_id: Uuid,
    #[serde(default)]
    pub running_task_ids: Vec<Uuid>,
    #[serde(default)]
    pub system_load: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatDirectives {
    #[serde(default)]
    pub cancel_task_ids: Vec<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_tasks: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub status: String,
    pub directives: HeartbeatDirectives,
}

/// `GET /workers/tasks/poll` replies with a flat JSON array; the worker
/// client also tolerates a `{"tasks": [...]}` envelope (original behavior
/// preserved 1:1 by `kira_worker::client::ServerClient`).
pub type PollTasksResponse = Vec<Task>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimTaskRequest {
    pub worker_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRequest {
    pub worker_id: Uuid,
    #[serde(default)]
    pub progress_text: Option<String>,
    #[serde(default)]
    pub step: Option<i64>,
    #[serde(default)]
    pub total_steps: Option<i64>,
    #[serde(default)]
    pub phase: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteTaskRequest {
    pub worker_id: Uuid,
    #[serde(default)]
    pub output_text: Option<String>,
    #[serde(default)]
    pub result_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailTaskRequest {
    pub worker_id: Uuid,
    pub error_summary: String,
    #[serde(default)]
    pub output_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMutationResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_action: Option<String>,
}

/// `GET /boards/{id}/settings`, consulted by
/// `kira_worker::workspace::WorkspaceResolver` before a task executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardSettingsResponse {
    pub board_id: Uuid,
    pub settings: BoardSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateBoardRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateColumnRequest {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub agent_type: Option<String>,
    #[serde(default)]
    pub auto_run: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateColumnRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success_column_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure_column_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCardRequest {
    pub column_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveCardRequest {
    pub dest_column_id: Uuid,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub skip_automation: bool,
}

/// Events fanned out to `/api/events/ws` subscribers — the server-side
/// counterpart of the daemon's `status` broadcast, covering task lifecycle
/// and worker state changes for a live kanban UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    Created { task: Task },
    Claimed { task_id: Uuid, worker_id: Uuid },
    Progress { task_id: Uuid, progress_text: Option<String> },
    Completed { task_id: Uuid, card_id: Option<Uuid> },
    Failed { task_id: Uuid, card_id: Option<Uuid>, error_summary: String },
    Cancelled { task_id: Uuid },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerEvent {
    Registered { worker_id: Uuid },
    Heartbeat { worker_id: Uuid, at: DateTime<Utc> },
    Stale { worker_id: Uuid },
    Offline { worker_id: Uuid },
}
