//! Admission control: which executions may start, and duplicate-prompt
//! screening on create.
//!
//! Endpoint admission runs in the orchestrator after the state is loaded and
//! before `start_execution`; violations map to 409 with a human-readable
//! reason. Duplicate admission runs before everything else on create.

use chrono::{DateTime, Utc};
use quorum_types::error::DomainError;
use quorum_types::workflow::{WorkflowPhase, WorkflowState, WorkflowStatus};

use crate::workflow::runner::ExecutionKind;

/// Check whether `kind` may start against the current state.
pub fn admit(kind: ExecutionKind, state: &WorkflowState) -> Result<(), DomainError> {
    use WorkflowStatus::*;

    if state.status == Running {
        return Err(DomainError::conflict("execution already in progress"));
    }

    match kind {
        ExecutionKind::Run => match state.status {
            Pending | Failed | Paused => Ok(()),
            _ if !state.checkpoints.is_empty() => Ok(()),
            Completed => Err(DomainError::conflict(
                "workflow already completed; create a new workflow to run again",
            )),
            Running => unreachable!("rejected above"),
        },
        ExecutionKind::Analyze => match state.status {
            Pending | Failed => Ok(()),
            Completed if state.current_phase == WorkflowPhase::Analyze => Ok(()),
            Completed => Err(DomainError::conflict(
                "analysis already completed for this workflow",
            )),
            _ => Err(DomainError::conflict(format!(
                "analyze requires a pending or failed workflow (status is {})",
                state.status
            ))),
        },
        ExecutionKind::Plan => {
            if state.current_phase == WorkflowPhase::Plan {
                Ok(())
            } else {
                Err(DomainError::conflict(format!(
                    "workflow is not ready for planning: current phase is {} (analyze must complete first)",
                    state.current_phase
                )))
            }
        }
        ExecutionKind::Replan => {
            if matches!(
                state.current_phase,
                WorkflowPhase::Plan | WorkflowPhase::Execute
            ) {
                Ok(())
            } else {
                Err(DomainError::conflict(format!(
                    "replan requires an existing plan: current phase is {}",
                    state.current_phase
                )))
            }
        }
        ExecutionKind::Execute => {
            if state.status == Paused {
                return Ok(());
            }
            if state.current_phase != WorkflowPhase::Execute {
                return Err(DomainError::conflict(format!(
                    "workflow is not ready for execution: current phase is {}",
                    state.current_phase
                )));
            }
            if state.tasks.is_empty() {
                return Err(DomainError::conflict(
                    "workflow has no tasks to execute; run planning first",
                ));
            }
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Duplicate admission
// ---------------------------------------------------------------------------

/// Outcome of duplicate screening: pass-through, possibly with a warning
/// enumerating older duplicates.
#[derive(Debug, Default)]
pub struct DuplicateVerdict {
    pub warning: Option<String>,
}

/// Screen a create request against existing byte-exact prompt matches.
///
/// - Any match still pending or running is a conflict.
/// - A match created inside the cool-down window is a conflict carrying the
///   remaining seconds.
/// - Older matches are admitted with a warning naming up to three of them.
pub fn check_duplicates(
    matches: &[WorkflowState],
    now: DateTime<Utc>,
    window: chrono::Duration,
) -> Result<DuplicateVerdict, DomainError> {
    let active: Vec<&WorkflowState> = matches
        .iter()
        .filter(|w| matches!(w.status, WorkflowStatus::Pending | WorkflowStatus::Running))
        .collect();
    if !active.is_empty() {
        let listing = active
            .iter()
            .map(|w| format!("{} ({})", w.id, w.status))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(DomainError::conflict(format!(
            "a workflow with the same prompt is already active: {listing}"
        )));
    }

    for w in matches {
        let age = now.signed_duration_since(w.created_at);
        if age < window {
            let remaining = (window - age).num_seconds().max(1);
            return Err(DomainError::conflict(format!(
                "a workflow with this prompt was created {}s ago. Please wait {remaining}s before creating a duplicate",
                age.num_seconds().max(0)
            )));
        }
    }

    if matches.is_empty() {
        return Ok(DuplicateVerdict::default());
    }

    let mut named: Vec<String> = matches.iter().take(3).map(|w| w.id.to_string()).collect();
    let overflow = matches.len().saturating_sub(named.len());
    if overflow > 0 {
        named.push(format!("and {overflow} more"));
    }
    Ok(DuplicateVerdict {
        warning: Some(format!(
            "prompt was previously used by {}",
            named.join(", ")
        )),
    })
}
