//! `POST /workers/register`, `POST /workers/heartbeat`.

use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::Utc;
use kira_api_types::{HeartbeatRequest, HeartbeatResponse, RegisterWorkerRequest, RegisterWorkerResponse, WorkerEvent};
use kira_db::workers;

use crate::api_error::ApiError;
use crate::auth::AuthedUser;
use crate::state::ApiState;

pub async fn register(
    State(state): State<Arc<ApiState>>,
    AuthedUser(user_id): AuthedUser,
    Json(req): Json<RegisterWorkerRequest>,
) -> Result<Json<RegisterWorkerResponse>, ApiError> {
    let worker = workers::register_worker(
        &state.store,
        user_id,
        req.hostname,
        req.worker_version,
        req.capabilities,
    )
    .await?;
    state
        .worker_events
        .publish(WorkerEvent::Registered { worker_id: worker.id });
    Ok(Json(RegisterWorkerResponse {
        worker_id: worker.id,
        poll_interval_seconds: None,
        max_concurrent_tasks: None,
    }))
}

pub async fn heartbeat(
    State(state): State<Arc<ApiState>>,
    AuthedUser(_user_id): AuthedUser,
    Json(req): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let result = workers::heartbeat(&state.store, req.worker_id, &req.running_task_ids, req.system_load).await?;
    state.worker_events.publish(WorkerEvent::Heartbeat {
        worker_id: req.worker_id,
        at: Utc::now(),
    });
    Ok(Json(HeartbeatResponse {
        status: result.status.as_str().to_string(),
        directives: kira_api_types::HeartbeatDirectives {
            cancel_task_ids: result.directives.cancel_task_ids,
            max_concurrent_tasks: result.directives.max_concurrent_tasks,
        },
    }))
}
