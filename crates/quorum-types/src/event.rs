//! Progress events fanned out to SSE subscribers.
//!
//! Events are fire-and-forget notifications; durable agent history is
//! persisted on the workflow state by the runner's notifier, not here.

use serde::{Deserialize, Serialize};

use crate::id::WorkflowId;
use crate::workflow::{TaskStatus, WorkflowPhase};

/// A progress event for one workflow.
///
/// The enum tag doubles as the SSE `event:` name; the struct body is the
/// `data:` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    WorkflowStarted {
        workflow_id: WorkflowId,
        phase: WorkflowPhase,
    },
    PhaseStarted {
        workflow_id: WorkflowId,
        phase: WorkflowPhase,
    },
    PhaseCompleted {
        workflow_id: WorkflowId,
        phase: WorkflowPhase,
    },
    TaskUpdate {
        workflow_id: WorkflowId,
        task_id: String,
        status: TaskStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    IssuesGenerationProgress {
        workflow_id: WorkflowId,
        completed: u32,
        total: u32,
        message: String,
    },
    IssuesPublishingProgress {
        workflow_id: WorkflowId,
        completed: u32,
        total: u32,
        message: String,
    },
    WorkflowCompleted {
        workflow_id: WorkflowId,
    },
    WorkflowFailed {
        workflow_id: WorkflowId,
        phase: WorkflowPhase,
        error: String,
    },
}

impl WorkflowEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::WorkflowStarted { .. } => "workflow_started",
            Self::PhaseStarted { .. } => "phase_started",
            Self::PhaseCompleted { .. } => "phase_completed",
            Self::TaskUpdate { .. } => "task_update",
            Self::IssuesGenerationProgress { .. } => "issues_generation_progress",
            Self::IssuesPublishingProgress { .. } => "issues_publishing_progress",
            Self::WorkflowCompleted { .. } => "workflow_completed",
            Self::WorkflowFailed { .. } => "workflow_failed",
        }
    }

    /// The workflow this event belongs to.
    pub fn workflow_id(&self) -> &WorkflowId {
        match self {
            Self::WorkflowStarted { workflow_id, .. }
            | Self::PhaseStarted { workflow_id, .. }
            | Self::PhaseCompleted { workflow_id, .. }
            | Self::TaskUpdate { workflow_id, .. }
            | Self::IssuesGenerationProgress { workflow_id, .. }
            | Self::IssuesPublishingProgress { workflow_id, .. }
            | Self::WorkflowCompleted { workflow_id }
            | Self::WorkflowFailed { workflow_id, .. } => workflow_id,
        }
    }
}
