//! Board/column settings and structure endpoints consumed by the planner
//! executor and the worker client's board bootstrap calls.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use kira_api_types::{BoardSettingsResponse, CreateColumnRequest, UpdateBoardRequest, UpdateColumnRequest};
use kira_core::types::Column;
use uuid::Uuid;

use crate::api_error::ApiError;
use crate::state::ApiState;

pub async fn get_settings(
    State(state): State<Arc<ApiState>>,
    Path(board_id): Path<Uuid>,
) -> Result<Json<BoardSettingsResponse>, ApiError> {
    let board = state
        .store
        .get_board(board_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(board_id.to_string()))?;
    Ok(Json(BoardSettingsResponse {
        board_id: board.id,
        settings: board.settings,
    }))
}

pub async fn update_board(
    State(state): State<Arc<ApiState>>,
    Path(board_id): Path<Uuid>,
    Json(req): Json<UpdateBoardRequest>,
) -> Result<Json<BoardSettingsResponse>, ApiError> {
    state
        .store
        .update_board_name_description(board_id, req.name, req.description)
        .await?;
    let board = state
        .store
        .get_board(board_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(board_id.to_string()))?;
    Ok(Json(BoardSettingsResponse {
        board_id: board.id,
        settings: board.settings,
    }))
}

pub async fn create_column(
    State(state): State<Arc<ApiState>>,
    Path(board_id): Path<Uuid>,
    Json(req): Json<CreateColumnRequest>,
) -> Result<Json<Column>, ApiError> {
    // `req.color` has no persisted counterpart — the planner executor only
    // needs it for presentation, kira-db's schema carries no color column.
    let _ = req.color;
    let columns = state.store.list_columns(board_id).await?;
    let column = Column {
        id: Uuid::new_v4(),
        board_id,
        name: req.name,
        position: columns.len() as i32,
        auto_run: req.auto_run,
        agent_type: req.agent_type,
        agent_model: None,
        agent_skill: None,
        prompt_template: None,
        max_loop_count: Column::default_max_loop_count(),
        on_success_column_id: None,
        on_failure_column_id: None,
    };
    let column = state.store.create_column(&column).await?;
    Ok(Json(column))
}

pub async fn update_column(
    State(state): State<Arc<ApiState>>,
    Path(column_id): Path<Uuid>,
    Json(req): Json<UpdateColumnRequest>,
) -> Result<Json<Column>, ApiError> {
    state
        .store
        .update_column_routing(column_id, req.on_success_column_id, req.on_failure_column_id)
        .await?;
    let column = state
        .store
        .get_column(column_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(column_id.to_string()))?;
    Ok(Json(column))
}
