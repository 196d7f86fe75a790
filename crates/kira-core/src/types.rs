//! Domain types shared by the server, worker, and daemon.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// Lifecycle state of a [`Task`]. Transitions follow a DAG:
/// `pending -> claimed -> running -> {completed, failed, cancelled}`, plus
/// `pending -> cancelled` and `claimed -> cancelled`. No outgoing
/// transitions exist from `completed`, `failed`, or `cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Claimed,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Whether a transition from `self` to `next` is allowed by the state
    /// machine.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Claimed)
                | (Pending, Cancelled)
                | (Claimed, Running)
                | (Claimed, Failed)
                | (Claimed, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Claimed => "claimed",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

/// The discriminant of a task. Re-modeled from the source's untyped
/// `task_type` string as a proper enum; `payload` still carries a
/// type-specific body (see [`TaskPayload`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    AgentRun,
    BoardPlan,
    CardGen,
    JiraImport,
    JiraPush,
    JiraSync,
    GitlabCreateProject,
    GitlabPush,
    /// A `task_type` string the worker doesn't recognize. Maps straight to
    /// `fail_task("Unknown task type")` rather than failing JSON
    /// deserialization of the whole task row.
    #[serde(other)]
    Unknown,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::AgentRun => "agent_run",
            TaskType::BoardPlan => "board_plan",
            TaskType::CardGen => "card_gen",
            TaskType::JiraImport => "jira_import",
            TaskType::JiraPush => "jira_push",
            TaskType::JiraSync => "jira_sync",
            TaskType::GitlabCreateProject => "gitlab_create_project",
            TaskType::GitlabPush => "gitlab_push",
            TaskType::Unknown => "unknown",
        }
    }

    /// Parses a wire/row `task_type` string, falling back to `Unknown`
    /// rather than rejecting the row outright.
    pub fn parse(s: &str) -> Self {
        match s {
            "agent_run" => TaskType::AgentRun,
            "board_plan" => TaskType::BoardPlan,
            "card_gen" => TaskType::CardGen,
            "jira_import" => TaskType::JiraImport,
            "jira_push" => TaskType::JiraPush,
            "jira_sync" => TaskType::JiraSync,
            "gitlab_create_project" => TaskType::GitlabCreateProject,
            "gitlab_push" => TaskType::GitlabPush,
            _ => TaskType::Unknown,
        }
    }
}

/// Type-specific payload, re-modeled as a tagged sum type (the source's
/// `payload_json` is an untyped bag). Unknown shapes decode to
/// `Unknown`, which the worker maps straight to a failed task with a fixed
/// error summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
    AgentRun,
    BoardPlan { prompt: String },
    CardGen { target_column_id: Uuid, prompt: String },
    JiraImport { jql: String, column_id: Uuid },
    JiraPush { card_title: String, description: String },
    JiraSync,
    GitlabCreateProject { name: String, description: Option<String> },
    GitlabPush {
        project_id: u64,
        project_path: Option<String>,
        default_branch: Option<String>,
        mr_prefix: Option<String>,
        card_title: Option<String>,
        branch_name: Option<String>,
        create_mr: bool,
        commit_message: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub board_id: Uuid,
    pub card_id: Option<Uuid>,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub agent_type: Option<String>,
    pub agent_model: Option<String>,
    pub agent_skill: Option<String>,
    pub prompt_text: Option<String>,
    pub payload: TaskPayload,
    pub source_column_id: Option<Uuid>,
    pub target_column_id: Option<Uuid>,
    pub failure_column_id: Option<Uuid>,
    pub priority: i32,
    pub created_by: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub worker_id: Option<Uuid>,
    pub output_text: Option<String>,
    pub error_summary: Option<String>,
    pub result_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Construct a new task in `pending` status with defaulted timestamps.
    pub fn new(board_id: Uuid, task_type: TaskType, payload: TaskPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            board_id,
            card_id: None,
            task_type,
            status: TaskStatus::Pending,
            agent_type: None,
            agent_model: None,
            agent_skill: None,
            prompt_text: None,
            payload,
            source_column_id: None,
            target_column_id: None,
            failure_column_id: None,
            priority: 0,
            created_by: None,
            assigned_to: None,
            worker_id: None,
            output_text: None,
            error_summary: None,
            result_data: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Card / Column / Board
// ---------------------------------------------------------------------------

/// Denormalized mirror of a card's latest task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    None,
    Pending,
    Running,
    Completed,
    Failed,
}

impl AgentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::None => "",
            AgentStatus::Pending => "pending",
            AgentStatus::Running => "running",
            AgentStatus::Completed => "completed",
            AgentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => AgentStatus::Pending,
            "running" => AgentStatus::Running,
            "completed" => AgentStatus::Completed,
            "failed" => AgentStatus::Failed,
            _ => AgentStatus::None,
        }
    }
}

impl From<TaskStatus> for AgentStatus {
    fn from(s: TaskStatus) -> Self {
        match s {
            TaskStatus::Pending => AgentStatus::Pending,
            TaskStatus::Claimed | TaskStatus::Running => AgentStatus::Running,
            TaskStatus::Completed => AgentStatus::Completed,
            TaskStatus::Failed => AgentStatus::Failed,
            TaskStatus::Cancelled => AgentStatus::None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: Uuid,
    pub board_id: Uuid,
    pub column_id: Uuid,
    pub position: i32,
    pub title: String,
    pub description: String,
    pub priority: String,
    pub labels: Vec<String>,
    pub assignee_id: Option<Uuid>,
    pub agent_status: AgentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub id: Uuid,
    pub board_id: Uuid,
    pub name: String,
    pub position: i32,
    pub auto_run: bool,
    pub agent_type: Option<String>,
    pub agent_model: Option<String>,
    pub agent_skill: Option<String>,
    pub prompt_template: Option<String>,
    pub max_loop_count: i32,
    pub on_success_column_id: Option<Uuid>,
    pub on_failure_column_id: Option<Uuid>,
}

impl Column {
    /// A column is terminal iff `auto_run = false`.
    pub fn is_terminal(&self) -> bool {
        !self.auto_run
    }

    pub fn default_max_loop_count() -> i32 {
        3
    }
}

/// Board-level GitLab automation settings, read out of the settings JSON bag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitLabBoardSettings {
    pub project_id: Option<u64>,
    pub project_path: Option<String>,
    pub default_branch: Option<String>,
    #[serde(default)]
    pub auto_push: bool,
    #[serde(default)]
    pub push_on_complete: bool,
    pub mr_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceBoardSettings {
    pub local_path: Option<String>,
    pub gitlab_project: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoardSettings {
    #[serde(default)]
    pub workspace: WorkspaceBoardSettings,
    #[serde(default)]
    pub gitlab: GitLabBoardSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: String,
    pub settings: BoardSettings,
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Online,
    Stale,
    Offline,
}

impl WorkerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerStatus::Online => "online",
            WorkerStatus::Stale => "stale",
            WorkerStatus::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: Uuid,
    pub user_id: Uuid,
    pub hostname: String,
    pub version: String,
    pub status: WorkerStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub capabilities: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_to_claimed_allowed() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Claimed));
    }

    #[test]
    fn terminal_states_have_no_outgoing_transitions() {
        for next in [
            TaskStatus::Pending,
            TaskStatus::Claimed,
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ] {
            assert!(!TaskStatus::Completed.can_transition_to(next));
            assert!(!TaskStatus::Failed.can_transition_to(next));
            assert!(!TaskStatus::Cancelled.can_transition_to(next));
        }
    }

    #[test]
    fn no_backward_transitions() {
        assert!(!TaskStatus::Running.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Claimed.can_transition_to(TaskStatus::Pending));
    }

    #[test]
    fn column_terminal_iff_not_auto_run() {
        let mut col = Column {
            id: Uuid::new_v4(),
            board_id: Uuid::new_v4(),
            name: "Plan".into(),
            position: 0,
            auto_run: false,
            agent_type: None,
            agent_model: None,
            agent_skill: None,
            prompt_template: None,
            max_loop_count: Column::default_max_loop_count(),
            on_success_column_id: None,
            on_failure_column_id: None,
        };
        assert!(col.is_terminal());
        col.auto_run = true;
        assert!(!col.is_terminal());
    }

    #[test]
    fn unknown_payload_kind_decodes_to_unknown() {
        let v = serde_json::json!({"kind": "something_new", "foo": "bar"});
        let payload: TaskPayload = serde_json::from_value(v).unwrap();
        assert!(matches!(payload, TaskPayload::Unknown));
    }

    #[test]
    fn unrecognized_task_type_parses_to_unknown() {
        assert!(matches!(TaskType::parse("something_new"), TaskType::Unknown));
        assert!(matches!(TaskType::parse("agent_run"), TaskType::AgentRun));
    }

    #[test]
    fn unknown_task_type_deserializes_from_wire() {
        let v = serde_json::Value::String("a_future_task_type".to_string());
        let parsed: TaskType = serde_json::from_value(v).unwrap();
        assert!(matches!(parsed, TaskType::Unknown));
    }
}
