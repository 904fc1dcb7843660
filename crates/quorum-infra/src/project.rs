//! Project directory layout and path safety.
//!
//! Everything Quorum persists for a project lives under `{root}/.quorum/`:
//! `config.yaml`, `quorum.db`, `runs/{workflowID}/` artifacts, and
//! `issues/{workflowID}/draft/` issue drafts. The project-files endpoint may
//! read and write inside the project root only, and never through the
//! forbidden patterns below (except workflow artifacts under
//! `.quorum/runs/`).

use std::path::{Component, Path, PathBuf};

use quorum_types::id::WorkflowId;
use thiserror::Error;

/// Path resolution failures. All map to a permission error at the API layer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path escapes the project root")]
    Escape,

    #[error("access to '{0}' is forbidden")]
    Forbidden(String),

    #[error("invalid path")]
    Invalid,
}

/// Filesystem layout for one project.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn quorum_dir(&self) -> PathBuf {
        self.root.join(".quorum")
    }

    pub fn db_path(&self) -> PathBuf {
        self.quorum_dir().join("quorum.db")
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.quorum_dir().join("runs")
    }

    /// Artifact directory for one workflow: `.quorum/runs/{workflowID}`.
    pub fn report_dir(&self, id: &WorkflowId) -> PathBuf {
        self.runs_dir().join(id.as_str())
    }

    /// Draft directory for one workflow: `.quorum/issues/{workflowID}/draft`.
    pub fn draft_dir(&self, id: &WorkflowId) -> PathBuf {
        self.quorum_dir()
            .join("issues")
            .join(id.as_str())
            .join("draft")
    }

    /// Create the `.quorum` skeleton (idempotent).
    pub async fn ensure_layout(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(self.runs_dir()).await
    }

    /// Eagerly create a workflow's report directory. Best-effort callers log
    /// and continue on failure.
    pub async fn create_report_dir(&self, id: &WorkflowId) -> std::io::Result<()> {
        tokio::fs::create_dir_all(self.report_dir(id)).await
    }

    /// Best-effort removal of a workflow's artifacts and drafts.
    pub async fn remove_workflow_files(&self, id: &WorkflowId) {
        for dir in [
            self.report_dir(id),
            self.quorum_dir().join("issues").join(id.as_str()),
        ] {
            if let Err(err) = tokio::fs::remove_dir_all(&dir).await {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %dir.display(), error = %err, "failed to remove workflow files");
                }
            }
        }
    }

    /// Resolve a caller-supplied relative path against the project root.
    ///
    /// Rejects absolute paths, any `..` traversal, the forbidden patterns
    /// (`.env*`, `.git/**`, `.ssh/**`, `*.pem`/`*.key`/`*.p12`, and
    /// `.quorum/**` outside `.quorum/runs/**`), and symlinks that lead
    /// outside the root. Nonexistent suffixes are allowed so new files can
    /// be created.
    pub fn resolve_path(&self, rel: &str) -> Result<PathBuf, PathError> {
        let rel_path = Path::new(rel);
        if rel_path.is_absolute() {
            return Err(PathError::Escape);
        }

        let mut clean = PathBuf::new();
        for component in rel_path.components() {
            match component {
                Component::Normal(part) => clean.push(part),
                Component::CurDir => {}
                _ => return Err(PathError::Escape),
            }
        }
        if clean.as_os_str().is_empty() {
            return Err(PathError::Invalid);
        }

        check_forbidden(&clean)?;

        let absolute = self.root.join(&clean);
        self.check_symlink_escape(&absolute)?;
        Ok(absolute)
    }

    /// Canonicalise the deepest existing ancestor and require it to stay
    /// under the canonical root. Catches symlinks pointing outside.
    fn check_symlink_escape(&self, absolute: &Path) -> Result<(), PathError> {
        let canonical_root = self.root.canonicalize().map_err(|_| PathError::Invalid)?;
        let mut probe = absolute.to_path_buf();
        loop {
            match probe.canonicalize() {
                Ok(canonical) => {
                    if canonical.starts_with(&canonical_root) {
                        return Ok(());
                    }
                    return Err(PathError::Escape);
                }
                Err(_) => match probe.parent() {
                    Some(parent) => probe = parent.to_path_buf(),
                    None => return Err(PathError::Escape),
                },
            }
        }
    }
}

fn check_forbidden(clean: &Path) -> Result<(), PathError> {
    let components: Vec<&str> = clean
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();

    for (index, part) in components.iter().enumerate() {
        if part.starts_with(".env") {
            return Err(PathError::Forbidden(clean.display().to_string()));
        }
        if *part == ".git" || *part == ".ssh" {
            return Err(PathError::Forbidden(clean.display().to_string()));
        }
        if index == components.len() - 1 {
            let lower = part.to_lowercase();
            if lower.ends_with(".pem") || lower.ends_with(".key") || lower.ends_with(".p12") {
                return Err(PathError::Forbidden(clean.display().to_string()));
            }
        }
    }

    // `.quorum/**` is sealed except the runs artifacts.
    if components.first() == Some(&".quorum") && components.get(1) != Some(&"runs") {
        return Err(PathError::Forbidden(clean.display().to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> (tempfile::TempDir, ProjectLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(dir.path());
        (dir, layout)
    }

    #[test]
    fn forbidden_paths_are_rejected() {
        let (_dir, layout) = layout();
        for bad in [
            "../x",
            ".env",
            ".env.local",
            ".git/config",
            ".ssh/id_rsa",
            "keys/x.pem",
            "certs/tls.key",
            "bundle.p12",
            ".quorum/quorum.db",
            ".quorum/config.yaml",
            "/etc/passwd",
        ] {
            assert!(layout.resolve_path(bad).is_err(), "accepted: {bad}");
        }
    }

    #[test]
    fn creation_friendly_and_runs_paths_are_allowed() {
        let (_dir, layout) = layout();
        // Nonexistent suffix inside the root: allowed so files can be created.
        layout.resolve_path("does-not-exist/sub").unwrap();
        layout.resolve_path("src/main.rs").unwrap();
        layout
            .resolve_path(".quorum/runs/wf-1/plan/final.md")
            .unwrap();
    }

    #[test]
    fn dot_segments_are_normalized() {
        let (_dir, layout) = layout();
        let resolved = layout.resolve_path("./src/./lib.rs").unwrap();
        assert!(resolved.ends_with("src/lib.rs"));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_is_rejected() {
        let outside = tempfile::tempdir().unwrap();
        let (dir, layout) = layout();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        assert_eq!(
            layout.resolve_path("link/secret.txt").unwrap_err(),
            PathError::Escape
        );
    }

    #[tokio::test]
    async fn layout_paths_and_skeleton() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(dir.path());
        layout.ensure_layout().await.unwrap();
        assert!(layout.runs_dir().exists());

        let id = WorkflowId::from("wf-20250801-120000-abcde");
        layout.create_report_dir(&id).await.unwrap();
        assert!(layout.report_dir(&id).exists());
        assert!(layout
            .draft_dir(&id)
            .ends_with(".quorum/issues/wf-20250801-120000-abcde/draft"));

        layout.remove_workflow_files(&id).await;
        assert!(!layout.report_dir(&id).exists());
    }
}
