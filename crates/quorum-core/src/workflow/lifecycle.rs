//! Status transition rules for the workflow state machine.
//!
//! Allowed transitions:
//!
//! | from      | to                         |
//! |-----------|----------------------------|
//! | pending   | running, failed            |
//! | running   | paused, completed, failed  |
//! | paused    | running, failed, completed |
//! | failed    | running (resume)           |
//! | completed | — (deletion only)          |

use quorum_types::error::DomainError;
use quorum_types::workflow::WorkflowStatus;

/// Whether `from -> to` is a legal status transition.
pub fn can_transition(from: WorkflowStatus, to: WorkflowStatus) -> bool {
    use WorkflowStatus::*;
    matches!(
        (from, to),
        (Pending, Running)
            | (Pending, Failed)
            | (Running, Paused)
            | (Running, Completed)
            | (Running, Failed)
            | (Paused, Running)
            | (Paused, Failed)
            | (Paused, Completed)
            | (Failed, Running)
    )
}

/// Validate a transition, producing the API-facing conflict on violation.
pub fn ensure_transition(
    from: WorkflowStatus,
    to: WorkflowStatus,
) -> Result<(), DomainError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(DomainError::conflict(format!(
            "invalid status transition: {from} -> {to}"
        )))
    }
}

/// Deletion is allowed from every non-running status.
pub fn can_delete(status: WorkflowStatus) -> bool {
    status != WorkflowStatus::Running
}

#[cfg(test)]
mod tests {
    use super::*;
    use WorkflowStatus::*;

    #[test]
    fn transition_table_matches_the_state_machine() {
        let allowed = [
            (Pending, Running),
            (Pending, Failed),
            (Running, Paused),
            (Running, Completed),
            (Running, Failed),
            (Paused, Running),
            (Paused, Failed),
            (Paused, Completed),
            (Failed, Running),
        ];
        for from in [Pending, Running, Paused, Completed, Failed] {
            for to in [Pending, Running, Paused, Completed, Failed] {
                let expect = allowed.contains(&(from, to));
                assert_eq!(
                    can_transition(from, to),
                    expect,
                    "transition {from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn completed_is_terminal() {
        for to in [Pending, Running, Paused, Failed] {
            assert!(!can_transition(Completed, to));
        }
        assert!(can_delete(Completed));
    }

    #[test]
    fn running_cannot_be_deleted() {
        assert!(!can_delete(Running));
        for status in [Pending, Paused, Completed, Failed] {
            assert!(can_delete(status));
        }
    }

    #[test]
    fn ensure_transition_names_both_statuses() {
        let err = ensure_transition(Completed, Running).unwrap_err();
        assert!(err.message.contains("completed"));
        assert!(err.message.contains("running"));
    }
}
