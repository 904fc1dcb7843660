//! Issue draft types: markdown documents with YAML frontmatter.
//!
//! Drafts live under `.quorum/issues/{workflowID}/draft/*.md`. The
//! frontmatter block carries the publishing metadata; the markdown body is
//! the issue text.

use serde::{Deserialize, Serialize};

use crate::error::IssueError;

/// Where a draft is in the publish pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    #[default]
    Draft,
    Ready,
    Published,
    Failed,
}

/// Issue provider selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueProvider {
    GitHub,
    GitLab,
}

impl IssueProvider {
    pub fn parse(raw: &str) -> Result<Self, IssueError> {
        match raw {
            "github" => Ok(Self::GitHub),
            "gitlab" => Ok(Self::GitLab),
            other => Err(IssueError::UnknownProvider(other.to_string())),
        }
    }
}

/// Validate an `owner/repo` repository reference.
pub fn validate_repository(repo: &str) -> Result<(), IssueError> {
    let mut parts = repo.split('/');
    let (owner, name, rest) = (parts.next(), parts.next(), parts.next());
    let valid_part = |p: &str| {
        !p.is_empty()
            && p.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    match (owner, name, rest) {
        (Some(o), Some(n), None) if valid_part(o) && valid_part(n) => Ok(()),
        _ => Err(IssueError::InvalidRepository(repo.to_string())),
    }
}

/// YAML frontmatter of a draft file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftFrontmatter {
    pub title: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub assignees: Vec<String>,
    #[serde(default)]
    pub is_main_issue: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default)]
    pub status: DraftStatus,
}

/// A single issue draft: frontmatter plus markdown body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueDraft {
    pub frontmatter: DraftFrontmatter,
    pub body: String,
}

impl IssueDraft {
    /// Render the on-disk form: `---\n<yaml>---\n\n<body>`.
    pub fn to_markdown(&self) -> Result<String, IssueError> {
        let yaml = serde_yaml_ng::to_string(&self.frontmatter)
            .map_err(|e| IssueError::Draft(format!("serialize frontmatter: {e}")))?;
        Ok(format!("---\n{yaml}---\n\n{}", self.body))
    }

    /// Parse the on-disk form back into a draft.
    pub fn parse(content: &str) -> Result<Self, IssueError> {
        let rest = content
            .strip_prefix("---\n")
            .ok_or_else(|| IssueError::Draft("missing frontmatter delimiter".to_string()))?;
        let (yaml, body) = rest
            .split_once("---")
            .ok_or_else(|| IssueError::Draft("unterminated frontmatter".to_string()))?;
        let frontmatter: DraftFrontmatter = serde_yaml_ng::from_str(yaml)
            .map_err(|e| IssueError::Draft(format!("parse frontmatter: {e}")))?;
        Ok(Self {
            frontmatter,
            body: body.trim_start_matches('\n').to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_draft() -> IssueDraft {
        IssueDraft {
            frontmatter: DraftFrontmatter {
                title: "Implement retry logic".to_string(),
                labels: vec!["quorum".to_string(), "task".to_string()],
                assignees: vec![],
                is_main_issue: false,
                task_id: Some("t-2".to_string()),
                status: DraftStatus::Draft,
            },
            body: "## Context\n\nRetry transient agent failures.\n".to_string(),
        }
    }

    #[test]
    fn markdown_roundtrip() {
        let draft = sample_draft();
        let md = draft.to_markdown().unwrap();
        assert!(md.starts_with("---\n"));
        assert!(md.contains("title: Implement retry logic"));
        let parsed = IssueDraft::parse(&md).unwrap();
        assert_eq!(parsed.frontmatter.title, draft.frontmatter.title);
        assert_eq!(parsed.frontmatter.task_id.as_deref(), Some("t-2"));
        assert!(parsed.body.contains("Retry transient"));
    }

    #[test]
    fn parse_rejects_missing_frontmatter() {
        assert!(IssueDraft::parse("just a body").is_err());
        assert!(IssueDraft::parse("---\ntitle: x\nno terminator").is_err());
    }

    #[test]
    fn provider_parsing() {
        assert_eq!(IssueProvider::parse("github").unwrap(), IssueProvider::GitHub);
        assert_eq!(IssueProvider::parse("gitlab").unwrap(), IssueProvider::GitLab);
        assert!(matches!(
            IssueProvider::parse("bitbucket"),
            Err(IssueError::UnknownProvider(_))
        ));
    }

    #[test]
    fn repository_validation() {
        assert!(validate_repository("acme/widgets").is_ok());
        assert!(validate_repository("acme-inc/widgets.rs").is_ok());
        for bad in ["", "acme", "acme/", "/widgets", "a/b/c", "acme/wid gets"] {
            assert!(validate_repository(bad).is_err(), "accepted: {bad}");
        }
    }

    #[test]
    fn draft_status_wire_encoding() {
        assert_eq!(
            serde_json::to_string(&DraftStatus::Published).unwrap(),
            "\"published\""
        );
    }
}
