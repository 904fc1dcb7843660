//! Kanban board endpoints.
//!
//! The board groups workflows by column; moving a card updates its column
//! and position. The auto-advance engine persists its own opaque state blob
//! through the engine-state accessors.

use std::collections::HashMap;

use axum::Json;
use serde::Deserialize;

use quorum_core::store::WorkflowStore;
use quorum_types::workflow::KanbanColumn;

use crate::http::error::ApiError;
use crate::project::Scope;

use super::workflow::{parse_workflow_id, WorkflowSummary};

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub workflow_id: String,
    pub column: KanbanColumn,
    #[serde(default)]
    pub position: i64,
}

/// GET /api/v1/board - workflows grouped by column, every column present.
pub async fn get_board(
    scope: Scope,
) -> Result<Json<HashMap<&'static str, Vec<WorkflowSummary>>>, ApiError> {
    let board = scope.0.store.board().await?;
    let mut columns: HashMap<&'static str, Vec<WorkflowSummary>> = HashMap::new();
    for column in KanbanColumn::ALL {
        columns.insert(
            column.as_str(),
            board.column(column).iter().map(WorkflowSummary::from).collect(),
        );
    }
    Ok(Json(columns))
}

/// POST /api/v1/board/move - move a workflow to a column/position.
pub async fn move_workflow(
    scope: Scope,
    Json(body): Json<MoveRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let workflow_id = parse_workflow_id(&body.workflow_id)?;
    scope
        .0
        .store
        .move_workflow(&workflow_id, body.column, body.position)
        .await?;
    Ok(Json(serde_json::json!({
        "id": body.workflow_id,
        "column": body.column,
        "position": body.position,
    })))
}

/// GET /api/v1/board/engine-state - the auto-advance engine's state blob.
pub async fn get_engine_state(
    scope: Scope,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = scope.0.store.engine_state().await?;
    Ok(Json(state.unwrap_or(serde_json::Value::Null)))
}

/// PUT /api/v1/board/engine-state - replace the engine state blob.
pub async fn put_engine_state(
    scope: Scope,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    scope.0.store.save_engine_state(&body).await?;
    Ok(Json(serde_json::json!({ "saved": true })))
}
