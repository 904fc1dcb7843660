//! Execution-starting handlers: run, analyze, plan, replan, execute.
//!
//! Every endpoint follows the same skeleton: resolve project, load state,
//! apply admission, `start_execution` on the tracker, spawn the execution
//! task, block on the start-confirmation latch, reply 202. The HTTP request
//! context is never handed to the runner: the spawned task owns a fresh
//! cancellation token (stored on the handle) plus a per-endpoint deadline,
//! and carries the project's resources by value, so closing the connection
//! cannot kill the run and cleanup writes always reach the right project.

use std::sync::Arc;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use quorum_core::store::WorkflowStore;
use quorum_core::workflow::admission;
use quorum_core::workflow::runner::{ExecContext, ExecutionKind, WorkflowRunner};
use quorum_types::event::WorkflowEvent;
use quorum_types::workflow::{WorkflowPhase, WorkflowState, WorkflowStatus};

use crate::http::error::ApiError;
use crate::project::Scope;
use crate::state::ProjectResources;

use super::workflow::parse_workflow_id;

// ---------------------------------------------------------------------------
// Wire DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct RunWorkflowResponse {
    pub id: String,
    pub status: WorkflowStatus,
    pub current_phase: WorkflowPhase,
}

#[derive(Debug, Serialize)]
pub struct PhaseResponse {
    pub id: String,
    pub status: WorkflowStatus,
    pub current_phase: WorkflowPhase,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReplanRequest {
    /// Optional extra context folded into the replanning prompt.
    #[serde(default)]
    pub context: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/workflows/{id}/run - start (or resume) the full pipeline.
pub async fn run_workflow(
    scope: Scope,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<RunWorkflowResponse>), ApiError> {
    let (id, phase) = start_execution(scope.0, &id, ExecutionKind::Run, None).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(RunWorkflowResponse {
            id,
            status: WorkflowStatus::Running,
            current_phase: phase,
        }),
    ))
}

/// POST /api/v1/workflows/{id}/analyze - analyze phase only.
pub async fn analyze_workflow(
    scope: Scope,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<PhaseResponse>), ApiError> {
    phase_endpoint(scope, id, ExecutionKind::Analyze, None).await
}

/// POST /api/v1/workflows/{id}/plan - plan phase only.
pub async fn plan_workflow(
    scope: Scope,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<PhaseResponse>), ApiError> {
    phase_endpoint(scope, id, ExecutionKind::Plan, None).await
}

/// POST /api/v1/workflows/{id}/replan - regenerate the plan, optionally with
/// additional context. Clears prior tasks and metrics.
pub async fn replan_workflow(
    scope: Scope,
    Path(id): Path<String>,
    body: Option<Json<ReplanRequest>>,
) -> Result<(StatusCode, Json<PhaseResponse>), ApiError> {
    let extra = body.and_then(|Json(b)| b.context);
    phase_endpoint(scope, id, ExecutionKind::Replan, extra).await
}

/// POST /api/v1/workflows/{id}/execute - execute phase (resumes the plan's
/// tasks; also the way back from paused).
pub async fn execute_workflow(
    scope: Scope,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<PhaseResponse>), ApiError> {
    phase_endpoint(scope, id, ExecutionKind::Execute, None).await
}

async fn phase_endpoint(
    scope: Scope,
    id: String,
    kind: ExecutionKind,
    extra: Option<String>,
) -> Result<(StatusCode, Json<PhaseResponse>), ApiError> {
    let (id, phase) = start_execution(scope.0, &id, kind, extra).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(PhaseResponse {
            id,
            status: WorkflowStatus::Running,
            current_phase: phase,
            message: format!("{} started", kind.label()),
        }),
    ))
}

// ---------------------------------------------------------------------------
// The shared orchestration skeleton
// ---------------------------------------------------------------------------

/// Steps 1-10 of the orchestration skeleton. Returns the workflow ID and the
/// phase reported back to the caller.
async fn start_execution(
    resources: Arc<ProjectResources>,
    raw_id: &str,
    kind: ExecutionKind,
    extra: Option<String>,
) -> Result<(String, WorkflowPhase), ApiError> {
    let workflow_id = parse_workflow_id(raw_id)?;

    // Load and admit before touching the tracker.
    let state = resources
        .store
        .load(&workflow_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("workflow not found".to_string()))?;
    admission::admit(kind, &state).map_err(ApiError::from)?;

    // Atomic admission: row marked running, handle registered.
    let handle = resources.tracker.start_execution(&workflow_id).await?;

    // Detached execution context: fresh cancel source, stored on the handle
    // so /cancel can tear the run down after the grace period.
    let cancel = CancellationToken::new();
    handle.set_exec_cancel(cancel.clone());

    // Reload: start_execution rewrote status, heartbeat, and counters.
    let fresh = match resources.store.load(&workflow_id).await {
        Ok(Some(fresh)) => fresh,
        Ok(None) => {
            resources
                .tracker
                .rollback_execution(&workflow_id, "workflow disappeared during start")
                .await;
            return Err(ApiError::NotFound("workflow not found".to_string()));
        }
        Err(err) => {
            resources
                .tracker
                .rollback_execution(&workflow_id, "state reload failed")
                .await;
            return Err(err.into());
        }
    };

    // Project-scoped runner factory. Failure here must undo the admission.
    let runner = match resources.runner_for(&fresh.blueprint).await {
        Ok(runner) => runner,
        Err(err) => {
            resources
                .tracker
                .rollback_execution(&workflow_id, "runner factory unavailable")
                .await;
            return Err(err);
        }
    };

    let reported_phase = fresh.current_phase;
    spawn_execution(
        Arc::clone(&resources),
        Arc::clone(&handle),
        runner,
        fresh,
        kind,
        extra,
        cancel,
    );

    // The caller's next poll must see running state backed by a live task.
    handle
        .wait_for_confirmation(resources.tracker.confirm_timeout())
        .await?;

    Ok((workflow_id.to_string(), reported_phase))
}

/// Spawn the detached execution task: confirm, run, publish the outcome,
/// and always finish + flush on the way out.
fn spawn_execution(
    resources: Arc<ProjectResources>,
    handle: Arc<quorum_core::execution::ExecutionHandle>,
    runner: crate::state::ConcreteRunner,
    mut state: WorkflowState,
    kind: ExecutionKind,
    extra: Option<String>,
    cancel: CancellationToken,
) {
    let exec_ctx = ExecContext {
        cancel: cancel.clone(),
        control: Arc::clone(handle.control()),
    };
    let workflow_id = state.id.clone();
    let deadline = kind.deadline();

    tokio::spawn(async move {
        handle.confirm_started();
        runner.notifier().publish(WorkflowEvent::WorkflowStarted {
            workflow_id: workflow_id.clone(),
            phase: state.current_phase,
        });
        tracing::info!(workflow_id = %workflow_id, kind = kind.label(), "execution task started");

        let outcome = tokio::time::timeout(deadline, async {
            match kind {
                ExecutionKind::Run => runner.run_with_state(&exec_ctx, &mut state).await,
                ExecutionKind::Analyze => runner.analyze_with_state(&exec_ctx, &mut state).await,
                ExecutionKind::Plan => runner.plan_with_state(&exec_ctx, &mut state).await,
                ExecutionKind::Replan => {
                    runner
                        .replan_with_state(&exec_ctx, &mut state, extra.as_deref())
                        .await
                }
                ExecutionKind::Execute => runner.resume_with_state(&exec_ctx, &mut state).await,
            }
        })
        .await;

        match &outcome {
            Ok(Ok(())) => {
                runner.notifier().publish(WorkflowEvent::WorkflowCompleted {
                    workflow_id: workflow_id.clone(),
                });
            }
            Ok(Err(err)) => {
                tracing::warn!(workflow_id = %workflow_id, error = %err, "execution failed");
                runner.notifier().publish(WorkflowEvent::WorkflowFailed {
                    workflow_id: workflow_id.clone(),
                    phase: state.current_phase,
                    error: err.to_string(),
                });
            }
            Err(_elapsed) => {
                // The deadline fired mid-await: tear down the context and
                // persist the timeout on the row ourselves.
                cancel.cancel();
                let message = "execution timed out".to_string();
                if let Ok(Some(mut row)) = resources.store.load(&workflow_id).await {
                    if row.status == WorkflowStatus::Running {
                        row.status = WorkflowStatus::Failed;
                        row.error = Some(message.clone());
                        row.last_error = Some(message.clone());
                        row.completed_at = Some(Utc::now());
                        if let Err(err) = resources.store.save(&mut row).await {
                            tracing::error!(workflow_id = %workflow_id, error = %err, "failed to persist timeout");
                        }
                    }
                }
                runner.notifier().publish(WorkflowEvent::WorkflowFailed {
                    workflow_id: workflow_id.clone(),
                    phase: state.current_phase,
                    error: message,
                });
            }
        }

        // Deferred cleanup: flush pending agent events, then drop the handle.
        // Both run against project-scoped resources captured by value, so
        // they succeed even though the originating request is long gone.
        // No flush after a timeout or external termination: the in-memory
        // state is stale there and must not overwrite the failed row.
        let flush_allowed = match &outcome {
            Ok(Ok(())) => true,
            Ok(Err(quorum_types::error::RunnerError::Terminated)) => false,
            Ok(Err(_)) => true,
            Err(_elapsed) => false,
        };
        if flush_allowed {
            if let Err(err) = runner.notifier().flush(&mut state).await {
                tracing::warn!(workflow_id = %workflow_id, error = %err, "failed to flush pending events");
            }
        }
        resources.tracker.finish_execution(&workflow_id).await;
    });
}
