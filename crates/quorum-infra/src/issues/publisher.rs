//! Issue publishing through the GitHub CLI.
//!
//! Shells out to `gh issue create`. The CLI owns authentication; its failure
//! output is classified into the domain taxonomy (auth vs rate-limit vs
//! plain publish failure) so handlers can map precisely to 401/429/500.

use quorum_types::error::IssueError;
use quorum_types::issue::IssueDraft;
use tokio::process::Command;

/// A successfully created issue.
#[derive(Debug, Clone)]
pub struct PublishedIssue {
    /// Issue URL as printed by the CLI.
    pub url: String,
}

/// Publisher seam; the handler layer depends on this, tests stub it.
pub trait IssuePublisher: Send + Sync {
    fn publish(
        &self,
        repository: &str,
        draft: &IssueDraft,
    ) -> impl std::future::Future<Output = Result<PublishedIssue, IssueError>> + Send;
}

/// `gh`-CLI-backed publisher.
#[derive(Clone, Default)]
pub struct GhCliPublisher;

impl IssuePublisher for GhCliPublisher {
    async fn publish(
        &self,
        repository: &str,
        draft: &IssueDraft,
    ) -> Result<PublishedIssue, IssueError> {
        let mut command = Command::new("gh");
        command
            .arg("issue")
            .arg("create")
            .arg("--repo")
            .arg(repository)
            .arg("--title")
            .arg(&draft.frontmatter.title)
            .arg("--body")
            .arg(&draft.body);
        for label in &draft.frontmatter.labels {
            command.arg("--label").arg(label);
        }
        for assignee in &draft.frontmatter.assignees {
            command.arg("--assignee").arg(assignee);
        }

        let output = command
            .output()
            .await
            .map_err(|e| IssueError::Publish(format!("failed to run gh: {e}")))?;

        if output.status.success() {
            let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
            tracing::info!(repository, url = url.as_str(), "issue published");
            Ok(PublishedIssue { url })
        } else {
            Err(classify_gh_failure(&String::from_utf8_lossy(&output.stderr)))
        }
    }
}

/// Map `gh` stderr to the error taxonomy.
fn classify_gh_failure(stderr: &str) -> IssueError {
    let lower = stderr.to_lowercase();
    if lower.contains("gh auth login")
        || lower.contains("not logged in")
        || lower.contains("authentication")
    {
        IssueError::NotAuthenticated
    } else if lower.contains("rate limit") {
        IssueError::RateLimited(stderr.trim().to_string())
    } else {
        IssueError::Publish(stderr.trim().to_string())
    }
}
