//! Workflow CRUD, activation, and artifact download handlers.
//!
//! Execution-starting endpoints live in `execution.rs`; pause/resume/cancel
//! in `control.rs`.

use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quorum_core::store::WorkflowStore;
use quorum_core::workflow::admission;
use quorum_core::workflow::lifecycle;
use quorum_infra::archive::zip_directory;
use quorum_types::blueprint::Blueprint;
use quorum_types::id::WorkflowId;
use quorum_types::workflow::{
    KanbanColumn, WorkflowPhase, WorkflowState, WorkflowStatus,
};

use crate::http::error::{ApiError, FieldError};
use crate::project::Scope;
use crate::state::resolve_agents;

// ---------------------------------------------------------------------------
// Wire DTOs
// ---------------------------------------------------------------------------

/// Short form for listings: no tasks, checkpoints, or agent events.
#[derive(Debug, Serialize)]
pub struct WorkflowSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub prompt: String,
    pub status: WorkflowStatus,
    pub current_phase: WorkflowPhase,
    pub kanban_column: KanbanColumn,
    pub kanban_position: i64,
    pub execution_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&WorkflowState> for WorkflowSummary {
    fn from(state: &WorkflowState) -> Self {
        Self {
            id: state.id.to_string(),
            title: state.title.clone(),
            prompt: state.prompt.clone(),
            status: state.status,
            current_phase: state.current_phase,
            kanban_column: state.kanban_column,
            kanban_position: state.kanban_position,
            execution_count: state.execution_count,
            error: state.error.clone(),
            created_at: state.created_at,
            updated_at: state.updated_at,
        }
    }
}

/// Full form: the complete state plus the tracker's live answer.
#[derive(Debug, Serialize)]
pub struct WorkflowDetail {
    #[serde(flatten)]
    pub state: WorkflowState,
    pub actually_running: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateWorkflowRequest {
    pub prompt: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub blueprint: Option<Blueprint>,
}

#[derive(Debug, Serialize)]
pub struct CreateWorkflowResponse {
    #[serde(flatten)]
    pub state: WorkflowState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateWorkflowRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub status: Option<WorkflowStatus>,
    #[serde(default)]
    pub phase: Option<WorkflowPhase>,
    #[serde(default)]
    pub blueprint: Option<Blueprint>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/workflows - list all workflows, newest first, short form.
pub async fn list_workflows(
    scope: Scope,
) -> Result<Json<Vec<WorkflowSummary>>, ApiError> {
    let workflows = scope.0.store.list().await?;
    Ok(Json(workflows.iter().map(WorkflowSummary::from).collect()))
}

/// POST /api/v1/workflows - create a workflow (status pending).
pub async fn create_workflow(
    scope: Scope,
    Json(body): Json<CreateWorkflowRequest>,
) -> Result<(StatusCode, Json<CreateWorkflowResponse>), ApiError> {
    let resources = scope.0;
    if body.prompt.trim().is_empty() {
        return Err(ApiError::validation(
            "invalid workflow",
            vec![FieldError::new("prompt", "prompt must not be empty", "REQUIRED")],
        ));
    }

    let config = resources.config().await;

    // Duplicate admission runs before everything else.
    let matches = resources.store.find_by_prompt(&body.prompt).await?;
    let verdict = admission::check_duplicates(
        &matches,
        Utc::now(),
        config.execution.duplicate_window(),
    )
    .map_err(ApiError::from)?;

    let blueprint = body.blueprint.unwrap_or_default();
    // Single-agent blueprints must name a configured, enabled agent.
    resolve_agents(&config, &blueprint)?;

    let mut state = WorkflowState::new(body.prompt, body.title, blueprint);

    // Report directory is materialised eagerly, best-effort.
    if let Err(err) = resources.layout.create_report_dir(&state.id).await {
        tracing::warn!(workflow_id = %state.id, error = %err, "failed to create report directory");
    }

    resources.store.save(&mut state).await?;
    tracing::info!(workflow_id = %state.id, "workflow created");

    Ok((
        StatusCode::CREATED,
        Json(CreateWorkflowResponse {
            state,
            warning: verdict.warning,
        }),
    ))
}

/// GET /api/v1/workflows/active - the active pointer's workflow, only while
/// it is actually running.
pub async fn active_workflow(
    scope: Scope,
) -> Result<Json<WorkflowDetail>, ApiError> {
    let resources = scope.0;
    let id = resources
        .store
        .active_workflow_id()
        .await?
        .ok_or_else(|| ApiError::NotFound("no active workflow".to_string()))?;
    let state = resources
        .store
        .load(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("no active workflow".to_string()))?;
    if state.status != WorkflowStatus::Running {
        return Err(ApiError::NotFound("no active workflow".to_string()));
    }
    let actually_running = resources.tracker.is_running(&id).await;
    Ok(Json(WorkflowDetail {
        state,
        actually_running,
    }))
}

/// GET /api/v1/workflows/{id} - full form including tasks and metrics.
pub async fn get_workflow(
    scope: Scope,
    Path(id): Path<String>,
) -> Result<Json<WorkflowDetail>, ApiError> {
    let resources = scope.0;
    let workflow_id = parse_workflow_id(&id)?;
    let state = resources
        .store
        .load(&workflow_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("workflow not found".to_string()))?;
    let actually_running = resources.tracker.is_running(&workflow_id).await;
    Ok(Json(WorkflowDetail {
        state,
        actually_running,
    }))
}

/// PATCH /api/v1/workflows/{id} - edit definition fields within the rules.
pub async fn update_workflow(
    scope: Scope,
    Path(id): Path<String>,
    Json(body): Json<UpdateWorkflowRequest>,
) -> Result<Json<WorkflowDetail>, ApiError> {
    let resources = scope.0;
    let workflow_id = parse_workflow_id(&id)?;
    let mut state = resources
        .store
        .load(&workflow_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("workflow not found".to_string()))?;

    let running =
        state.status == WorkflowStatus::Running || resources.tracker.is_running(&workflow_id).await;
    if running {
        return Err(ApiError::Conflict(
            "workflow is running; stop it before editing".to_string(),
        ));
    }

    if body.prompt.is_some() || body.blueprint.is_some() {
        if state.status != WorkflowStatus::Pending {
            return Err(ApiError::Conflict(
                "prompt and blueprint can only be edited while pending".to_string(),
            ));
        }
    }
    if let Some(prompt) = body.prompt {
        if prompt.trim().is_empty() {
            return Err(ApiError::validation(
                "invalid workflow",
                vec![FieldError::new("prompt", "prompt must not be empty", "REQUIRED")],
            ));
        }
        state.prompt = prompt;
    }
    if let Some(blueprint) = body.blueprint {
        state.blueprint = blueprint;
    }
    if let Some(title) = body.title {
        state.title = (!title.trim().is_empty()).then_some(title);
    }
    if let Some(status) = body.status {
        if status == WorkflowStatus::Running {
            return Err(ApiError::Conflict(
                "status cannot be set to running directly; use /run".to_string(),
            ));
        }
        if status != state.status {
            lifecycle::ensure_transition(state.status, status).map_err(ApiError::from)?;
            state.status = status;
        }
    }
    if let Some(phase) = body.phase {
        state.current_phase = phase;
    }

    resources.store.save(&mut state).await?;
    Ok(Json(WorkflowDetail {
        state,
        actually_running: false,
    }))
}

/// DELETE /api/v1/workflows/{id} - 204; refuses while running.
pub async fn delete_workflow(
    scope: Scope,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let resources = scope.0;
    let workflow_id = parse_workflow_id(&id)?;

    if resources.tracker.is_running(&workflow_id).await {
        return Err(ApiError::Conflict(
            "cannot delete a running workflow".to_string(),
        ));
    }
    let state = resources
        .store
        .load(&workflow_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("workflow not found".to_string()))?;
    if !lifecycle::can_delete(state.status) {
        return Err(ApiError::Conflict(
            "cannot delete a running workflow".to_string(),
        ));
    }

    resources.store.delete(&workflow_id).await?;
    resources.layout.remove_workflow_files(&workflow_id).await;
    tracing::info!(workflow_id = %workflow_id, "workflow deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/workflows/{id}/activate - point the active pointer here.
pub async fn activate_workflow(
    scope: Scope,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let resources = scope.0;
    let workflow_id = parse_workflow_id(&id)?;
    resources
        .store
        .load(&workflow_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("workflow not found".to_string()))?;
    resources
        .store
        .set_active_workflow_id(Some(&workflow_id))
        .await?;
    Ok(Json(serde_json::json!({ "id": id, "active": true })))
}

/// GET /api/v1/workflows/{id}/download - zip of the report directory.
pub async fn download_artifacts(
    scope: Scope,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let resources = scope.0;
    let workflow_id = parse_workflow_id(&id)?;
    let state = resources
        .store
        .load(&workflow_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("workflow not found".to_string()))?;
    if state.report_path.is_empty() {
        return Err(ApiError::NotFound("report directory missing".to_string()));
    }

    let dir = resources.layout.root().join(&state.report_path);
    let bytes = tokio::task::spawn_blocking(move || zip_directory(&dir))
        .await
        .map_err(|err| ApiError::Internal(format!("archive task failed: {err}")))??;

    let filename = format!("{workflow_id}-artifacts.zip");
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// Validate a path-supplied workflow ID.
pub fn parse_workflow_id(raw: &str) -> Result<WorkflowId, ApiError> {
    if raw.trim().is_empty() {
        return Err(ApiError::BadRequest("missing workflow ID".to_string()));
    }
    if !WorkflowId::is_valid(raw) {
        return Err(ApiError::BadRequest(format!(
            "invalid workflow ID: '{raw}'"
        )));
    }
    Ok(WorkflowId::from(raw))
}
