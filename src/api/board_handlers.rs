//! Plan, tab and task handlers

use super::handlers::{AppError, BoardState};
use crate::auth::extractor::AuthUser;
use crate::board::models::*;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

// ============================================================================
// Plans
// ============================================================================

pub async fn create_plan(
    State(state): State<BoardState>,
    user: AuthUser,
    Json(req): Json<CreatePlanRequest>,
) -> Result<(StatusCode, Json<PlanNode>), AppError> {
    let plan = state.board.create_plan(req, user.user_id).await?;
    Ok((StatusCode::CREATED, Json(plan)))
}

/// Board projection: ordered tabs with their ordered tasks
pub async fn get_board(
    State(state): State<BoardState>,
    Path(plan_id): Path<Uuid>,
) -> Result<Json<BoardView>, AppError> {
    Ok(Json(state.board.get_board(plan_id).await?))
}

// ============================================================================
// Tabs
// ============================================================================

pub async fn list_tabs(
    State(state): State<BoardState>,
    Path(plan_id): Path<Uuid>,
) -> Result<Json<Vec<TabNode>>, AppError> {
    Ok(Json(state.board.list_tabs(plan_id).await?))
}

pub async fn create_tab(
    State(state): State<BoardState>,
    Path(plan_id): Path<Uuid>,
    Json(req): Json<TabNameRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    let id = state.board.create_tab(plan_id, &req.name).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

pub async fn rename_tab(
    State(state): State<BoardState>,
    Path((plan_id, tab_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<TabNameRequest>,
) -> Result<Json<TabNode>, AppError> {
    Ok(Json(state.board.rename_tab(plan_id, tab_id, &req.name).await?))
}

pub async fn reorder_tab(
    State(state): State<BoardState>,
    Path((plan_id, tab_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<ReorderRequest>,
) -> Result<Json<OrderedIds>, AppError> {
    let ids = state
        .board
        .reorder_tab(plan_id, tab_id, req.new_prev_id)
        .await?;
    Ok(Json(OrderedIds { ids }))
}

pub async fn delete_tab(
    State(state): State<BoardState>,
    Path((plan_id, tab_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    state.board.remove_tab(plan_id, tab_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Tasks
// ============================================================================

pub async fn list_tasks(
    State(state): State<BoardState>,
    Path(tab_id): Path<Uuid>,
) -> Result<Json<Vec<TaskNode>>, AppError> {
    Ok(Json(state.board.list_tasks(tab_id).await?))
}

pub async fn create_task(
    State(state): State<BoardState>,
    user: AuthUser,
    Path(tab_id): Path<Uuid>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    let id = state.board.create_task(tab_id, req, user.user_id).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

pub async fn update_task(
    State(state): State<BoardState>,
    Path((tab_id, task_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<TaskNode>, AppError> {
    Ok(Json(state.board.update_task(tab_id, task_id, req).await?))
}

/// `new_prev_id: null` moves the task to the front of the tab
pub async fn reorder_task(
    State(state): State<BoardState>,
    Path((tab_id, task_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<ReorderRequest>,
) -> Result<Json<OrderedIds>, AppError> {
    let ids = state
        .board
        .reorder_task(tab_id, task_id, req.new_prev_id)
        .await?;
    Ok(Json(OrderedIds { ids }))
}

pub async fn delete_task(
    State(state): State<BoardState>,
    Path((tab_id, task_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    state.board.remove_task(tab_id, task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
