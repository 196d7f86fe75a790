//! Card creation and card-move endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use kira_api_types::{CreateCardRequest, MoveCardRequest, TaskEvent};
use kira_core::types::{AgentStatus, Card};
use uuid::Uuid;

use crate::api_error::ApiError;
use crate::auth::AuthedUser;
use crate::state::ApiState;

pub async fn create_card(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<CreateCardRequest>,
) -> Result<Json<Card>, ApiError> {
    let column = state
        .store
        .get_column(req.column_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(req.column_id.to_string()))?;
    let existing = state.store.list_cards(req.column_id).await?;
    let card = Card {
        id: Uuid::new_v4(),
        board_id: column.board_id,
        column_id: req.column_id,
        position: existing.len() as i32,
        title: req.title,
        description: req.description,
        priority: req.priority,
        labels: req.labels,
        assignee_id: None,
        agent_status: AgentStatus::None,
    };
    let card = state.store.create_card(&card).await?;
    Ok(Json(card))
}

pub async fn move_card(
    State(state): State<Arc<ApiState>>,
    AuthedUser(user_id): AuthedUser,
    Path(card_id): Path<Uuid>,
    Json(req): Json<MoveCardRequest>,
) -> Result<Json<Card>, ApiError> {
    let spawned = state
        .store
        .move_card(card_id, req.dest_column_id, req.position, user_id, req.skip_automation)
        .await?;
    if let Some(task) = spawned {
        state.task_events.publish(TaskEvent::Created { task });
    }
    let card = state
        .store
        .get_card(card_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(card_id.to_string()))?;
    Ok(Json(card))
}
