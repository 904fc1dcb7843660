//! Draft generation from workflow state.
//!
//! Produces one main (umbrella) issue plus one draft per planned task. Fast
//! previews reuse the same composition without touching disk.

use quorum_types::config::IssuesConfig;
use quorum_types::error::IssueError;
use quorum_types::issue::{DraftFrontmatter, DraftStatus, IssueDraft};
use quorum_types::workflow::{TaskState, WorkflowState};

use super::drafts::{DraftStore, MAIN_DRAFT};

/// Compose the main issue draft for a workflow.
pub fn main_draft(state: &WorkflowState, config: &IssuesConfig) -> IssueDraft {
    let title = state
        .title
        .clone()
        .unwrap_or_else(|| first_line(&state.prompt));
    let mut body = format!("## Request\n\n{}\n\n## Tasks\n\n", state.prompt);
    for task in state.tasks_in_order() {
        body.push_str(&format!("- [ ] {}\n", task.title));
    }
    IssueDraft {
        frontmatter: DraftFrontmatter {
            title,
            labels: config.labels.clone(),
            assignees: Vec::new(),
            is_main_issue: true,
            task_id: None,
            status: DraftStatus::Draft,
        },
        body,
    }
}

/// Compose the draft for one task.
pub fn task_draft(state: &WorkflowState, task: &TaskState, config: &IssuesConfig) -> IssueDraft {
    let mut body = String::new();
    if !task.description.is_empty() {
        body.push_str(&task.description);
        body.push_str("\n\n");
    }
    body.push_str(&format!(
        "## Context\n\nPart of workflow `{}`:\n\n> {}\n",
        state.id,
        first_line(&state.prompt)
    ));
    IssueDraft {
        frontmatter: DraftFrontmatter {
            title: task.title.clone(),
            labels: config.labels.clone(),
            assignees: Vec::new(),
            is_main_issue: false,
            task_id: Some(task.id.clone()),
            status: DraftStatus::Draft,
        },
        body,
    }
}

/// Generate and persist all drafts for a workflow. Returns the number
/// written (main + tasks). Calls `progress` after each write.
pub async fn generate_drafts(
    store: &DraftStore,
    state: &WorkflowState,
    config: &IssuesConfig,
    mut progress: impl FnMut(u32, u32),
) -> Result<u32, IssueError> {
    let total = state.task_order.len() as u32 + 1;
    let mut written = 0u32;

    store
        .write(&state.id, MAIN_DRAFT, &main_draft(state, config))
        .await?;
    written += 1;
    progress(written, total);

    for task in state.tasks_in_order() {
        store
            .write(&state.id, &task.id, &task_draft(state, task, config))
            .await?;
        written += 1;
        progress(written, total);
    }
    Ok(written)
}

/// Generate and persist the draft for a single task.
pub async fn generate_single(
    store: &DraftStore,
    state: &WorkflowState,
    task_id: &str,
    config: &IssuesConfig,
) -> Result<(), IssueError> {
    let task = state
        .tasks
        .get(task_id)
        .ok_or_else(|| IssueError::Draft(format!("task '{task_id}' not found")))?;
    store
        .write(&state.id, task_id, &task_draft(state, task, config))
        .await
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().trim().to_string()
}
