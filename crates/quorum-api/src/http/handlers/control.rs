//! Control endpoints: pause, resume, cancel, force-stop.
//!
//! These forward to the tracker's control dispatch; every error phrase comes
//! back verbatim as a 409 so clients can distinguish "not running" from
//! "already paused" from "already being cancelled".

use axum::extract::Path;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::http::error::ApiError;
use crate::project::Scope;

use super::workflow::parse_workflow_id;

#[derive(Debug, Serialize)]
pub struct WorkflowControlResponse {
    pub id: String,
    pub status: String,
    pub message: String,
}

/// POST /api/v1/workflows/{id}/pause - 200 once the pause latch is set.
pub async fn pause_workflow(
    scope: Scope,
    Path(id): Path<String>,
) -> Result<Json<WorkflowControlResponse>, ApiError> {
    let workflow_id = parse_workflow_id(&id)?;
    scope.0.tracker.pause(&workflow_id).await?;
    Ok(Json(WorkflowControlResponse {
        id,
        status: "paused".to_string(),
        message: "workflow paused; the runner stops at its next checkpoint".to_string(),
    }))
}

/// POST /api/v1/workflows/{id}/resume - 200 once the gate reopens.
pub async fn resume_workflow(
    scope: Scope,
    Path(id): Path<String>,
) -> Result<Json<WorkflowControlResponse>, ApiError> {
    let workflow_id = parse_workflow_id(&id)?;
    scope.0.tracker.resume(&workflow_id).await?;
    Ok(Json(WorkflowControlResponse {
        id,
        status: "running".to_string(),
        message: "workflow resumed".to_string(),
    }))
}

/// POST /api/v1/workflows/{id}/cancel - 202; the runner observes the latch
/// cooperatively, and the exec context is torn down if it does not.
pub async fn cancel_workflow(
    scope: Scope,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<WorkflowControlResponse>), ApiError> {
    let workflow_id = parse_workflow_id(&id)?;
    scope.0.tracker.cancel(&workflow_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(WorkflowControlResponse {
            id,
            status: "cancelling".to_string(),
            message: "cancellation requested; the workflow fails at its next checkpoint"
                .to_string(),
        }),
    ))
}

/// POST /api/v1/workflows/{id}/force-stop - 200; rewrites a zombie row to
/// failed without waiting for any runner. Idempotent.
pub async fn force_stop_workflow(
    scope: Scope,
    Path(id): Path<String>,
) -> Result<Json<WorkflowControlResponse>, ApiError> {
    let workflow_id = parse_workflow_id(&id)?;
    scope.0.tracker.force_stop(&workflow_id).await?;
    Ok(Json(WorkflowControlResponse {
        id,
        status: "failed".to_string(),
        message: "workflow stopped by forced stop".to_string(),
    }))
}
