//! Task poll/claim/progress/complete/fail endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use kira_api_types::{
    ClaimTaskRequest, CompleteTaskRequest, FailTaskRequest, ProgressRequest, TaskEvent,
    TaskMutationResponse,
};
use kira_core::types::Task;
use serde::Deserialize;
use uuid::Uuid;

use crate::api_error::ApiError;
use crate::auth::AuthedUser;
use crate::state::ApiState;

#[derive(Debug, Deserialize)]
pub struct PollQuery {
    /// Carried over from the wire contract for symmetry with the worker
    /// client, but task assignment is keyed by user id, not worker id — see
    /// `TaskStore::poll_tasks`.
    #[allow(dead_code)]
    pub worker_id: Uuid,
    #[serde(default = "default_poll_limit")]
    pub limit: i64,
}

fn default_poll_limit() -> i64 {
    10
}

pub async fn poll(
    State(state): State<Arc<ApiState>>,
    AuthedUser(user_id): AuthedUser,
    Query(q): Query<PollQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let tasks = state.store.poll_tasks(user_id, q.limit).await?;
    Ok(Json(tasks))
}

pub async fn claim(
    State(state): State<Arc<ApiState>>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<ClaimTaskRequest>,
) -> Result<Json<Task>, ApiError> {
    let task = state.store.claim_task(task_id, req.worker_id).await?;
    state.task_events.publish(TaskEvent::Claimed {
        task_id,
        worker_id: req.worker_id,
    });
    Ok(Json(task))
}

pub async fn progress(
    State(state): State<Arc<ApiState>>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<ProgressRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .store
        .update_progress(task_id, req.progress_text.clone(), req.step, req.total_steps, req.phase)
        .await?;
    state.task_events.publish(TaskEvent::Progress {
        task_id,
        progress_text: req.progress_text,
    });
    Ok(StatusCode::NO_CONTENT)
}

pub async fn complete(
    State(state): State<Arc<ApiState>>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<CompleteTaskRequest>,
) -> Result<Json<TaskMutationResponse>, ApiError> {
    let task = state
        .store
        .get_task(task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(task_id.to_string()))?;
    let outcome = state.store.complete_task(task_id, req.output_text, req.result_data).await?;
    state.task_events.publish(TaskEvent::Completed {
        task_id,
        card_id: task.card_id,
    });
    for new_task in &outcome.new_tasks {
        state.task_events.publish(TaskEvent::Created { task: new_task.clone() });
    }
    Ok(Json(TaskMutationResponse {
        status: "completed".into(),
        next_action: outcome.card_moved_to.map(|id| format!("card {id} moved")),
    }))
}

pub async fn fail(
    State(state): State<Arc<ApiState>>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<FailTaskRequest>,
) -> Result<StatusCode, ApiError> {
    let task = state
        .store
        .get_task(task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(task_id.to_string()))?;
    let outcome = state
        .store
        .fail_task(task_id, req.error_summary.clone(), req.output_text)
        .await?;
    state.task_events.publish(TaskEvent::Failed {
        task_id,
        card_id: task.card_id,
        error_summary: req.error_summary,
    });
    for new_task in &outcome.new_tasks {
        state.task_events.publish(TaskEvent::Created { task: new_task.clone() });
    }
    Ok(StatusCode::NO_CONTENT)
}
