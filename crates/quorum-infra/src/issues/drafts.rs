//! Issue draft storage.
//!
//! Drafts are markdown files with YAML frontmatter under
//! `.quorum/issues/{workflowID}/draft/`. The main issue is `main.md`; task
//! drafts are named after their task ID.

use std::path::PathBuf;

use quorum_types::error::IssueError;
use quorum_types::id::WorkflowId;
use quorum_types::issue::{DraftStatus, IssueDraft};

use crate::project::ProjectLayout;

/// File name of the main (umbrella) issue draft.
pub const MAIN_DRAFT: &str = "main";

/// Draft store for one project.
#[derive(Clone)]
pub struct DraftStore {
    layout: ProjectLayout,
}

impl DraftStore {
    pub fn new(layout: ProjectLayout) -> Self {
        Self { layout }
    }

    fn path(&self, workflow: &WorkflowId, name: &str) -> PathBuf {
        self.layout.draft_dir(workflow).join(format!("{name}.md"))
    }

    /// Write (or overwrite) a draft. `name` is `main` or a task ID.
    pub async fn write(
        &self,
        workflow: &WorkflowId,
        name: &str,
        draft: &IssueDraft,
    ) -> Result<(), IssueError> {
        let path = self.path(workflow, name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| IssueError::Draft(e.to_string()))?;
        }
        tokio::fs::write(&path, draft.to_markdown()?)
            .await
            .map_err(|e| IssueError::Draft(e.to_string()))
    }

    /// Read one draft by name; `None` when absent.
    pub async fn read(
        &self,
        workflow: &WorkflowId,
        name: &str,
    ) -> Result<Option<IssueDraft>, IssueError> {
        match tokio::fs::read_to_string(self.path(workflow, name)).await {
            Ok(content) => Ok(Some(IssueDraft::parse(&content)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(IssueError::Draft(err.to_string())),
        }
    }

    /// All drafts for a workflow as `(name, draft)`, main issue first.
    pub async fn list(
        &self,
        workflow: &WorkflowId,
    ) -> Result<Vec<(String, IssueDraft)>, IssueError> {
        let dir = self.layout.draft_dir(workflow);
        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(IssueError::Draft(err.to_string())),
        };

        let mut drafts = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| IssueError::Draft(e.to_string()))?
        {
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| IssueError::Draft(e.to_string()))?;
            drafts.push((stem.to_string(), IssueDraft::parse(&content)?));
        }

        drafts.sort_by(|(a, _), (b, _)| {
            // Main issue sorts first, the rest by name.
            (a != MAIN_DRAFT).cmp(&(b != MAIN_DRAFT)).then(a.cmp(b))
        });
        Ok(drafts)
    }

    /// Update one draft's status in place.
    pub async fn set_status(
        &self,
        workflow: &WorkflowId,
        name: &str,
        status: DraftStatus,
    ) -> Result<(), IssueError> {
        let mut draft = self
            .read(workflow, name)
            .await?
            .ok_or_else(|| IssueError::Draft(format!("draft '{name}' not found")))?;
        draft.frontmatter.status = status;
        self.write(workflow, name, &draft).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_types::issue::DraftFrontmatter;

    fn draft(title: &str, main: bool) -> IssueDraft {
        IssueDraft {
            frontmatter: DraftFrontmatter {
                title: title.to_string(),
                labels: vec!["quorum".to_string()],
                assignees: vec![],
                is_main_issue: main,
                task_id: (!main).then(|| "t-1".to_string()),
                status: DraftStatus::Draft,
            },
            body: format!("body of {title}"),
        }
    }

    #[tokio::test]
    async fn write_read_list_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DraftStore::new(ProjectLayout::new(dir.path()));
        let wf = WorkflowId::from("wf-20250801-120000-abcde");

        store.write(&wf, "t-1", &draft("Task one", false)).await.unwrap();
        store.write(&wf, MAIN_DRAFT, &draft("Umbrella", true)).await.unwrap();

        let read = store.read(&wf, "t-1").await.unwrap().unwrap();
        assert_eq!(read.frontmatter.title, "Task one");

        let all = store.list(&wf).await.unwrap();
        assert_eq!(all.len(), 2);
        // Main issue sorts first.
        assert_eq!(all[0].0, MAIN_DRAFT);
        assert!(all[0].1.frontmatter.is_main_issue);
    }

    #[tokio::test]
    async fn list_without_drafts_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = DraftStore::new(ProjectLayout::new(dir.path()));
        let wf = WorkflowId::from("wf-20250801-120000-abcde");
        assert!(store.list(&wf).await.unwrap().is_empty());
        assert!(store.read(&wf, "t-9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_status_rewrites_frontmatter() {
        let dir = tempfile::tempdir().unwrap();
        let store = DraftStore::new(ProjectLayout::new(dir.path()));
        let wf = WorkflowId::from("wf-20250801-120000-abcde");

        store.write(&wf, "t-1", &draft("Task", false)).await.unwrap();
        store
            .set_status(&wf, "t-1", DraftStatus::Published)
            .await
            .unwrap();

        let read = store.read(&wf, "t-1").await.unwrap().unwrap();
        assert_eq!(read.frontmatter.status, DraftStatus::Published);
    }
}
