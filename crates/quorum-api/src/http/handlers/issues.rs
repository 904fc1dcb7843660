//! Issue pipeline endpoints: draft generation, preview, editing, publishing,
//! and status.
//!
//! Drafts live on disk under `.quorum/issues/{workflowID}/draft/`; publishing
//! goes through the GitHub CLI. GitLab is recognised but not implemented.

use std::collections::HashMap;

use axum::extract::{Path, Query};
use axum::Json;
use serde::{Deserialize, Serialize};

use quorum_core::store::WorkflowStore;
use quorum_infra::issues::drafts::MAIN_DRAFT;
use quorum_infra::issues::generator;
use quorum_infra::issues::publisher::{GhCliPublisher, IssuePublisher};
use quorum_types::error::IssueError;
use quorum_types::event::WorkflowEvent;
use quorum_types::id::WorkflowId;
use quorum_types::issue::{validate_repository, DraftStatus, IssueDraft, IssueProvider};
use quorum_types::workflow::WorkflowState;

use crate::http::error::ApiError;
use crate::project::Scope;

use super::workflow::parse_workflow_id;

// ---------------------------------------------------------------------------
// Wire DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct DraftView {
    pub name: String,
    pub title: String,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub is_main_issue: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub status: DraftStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl DraftView {
    fn from_draft(name: &str, draft: &IssueDraft, include_body: bool) -> Self {
        Self {
            name: name.to_string(),
            title: draft.frontmatter.title.clone(),
            labels: draft.frontmatter.labels.clone(),
            assignees: draft.frontmatter.assignees.clone(),
            is_main_issue: draft.frontmatter.is_main_issue,
            task_id: draft.frontmatter.task_id.clone(),
            status: draft.frontmatter.status,
            body: include_body.then(|| draft.body.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SingleIssueRequest {
    pub task_id: String,
}

#[derive(Debug, Deserialize)]
pub struct FilesIssueRequest {
    /// Paths relative to the workflow's report directory.
    pub files: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    #[serde(default)]
    pub fast: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDraftRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub labels: Option<Vec<String>>,
    #[serde(default)]
    pub assignees: Option<Vec<String>>,
    #[serde(default)]
    pub status: Option<DraftStatus>,
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// POST /api/v1/workflows/{id}/issues - generate drafts for the main issue
/// and every planned task.
pub async fn generate_issues(
    scope: Scope,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let resources = scope.0;
    let workflow_id = parse_workflow_id(&id)?;
    let state = load_workflow(&resources, &workflow_id).await?;
    let config = resources.config().await;

    let bus = resources.bus.clone();
    let written = generator::generate_drafts(
        &resources.drafts,
        &state,
        &config.issues,
        |completed, total| {
            bus.publish(WorkflowEvent::IssuesGenerationProgress {
                workflow_id: state.id.clone(),
                completed,
                total,
                message: format!("generated {completed}/{total} drafts"),
            });
        },
    )
    .await?;

    Ok(Json(serde_json::json!({ "generated": written })))
}

/// POST /api/v1/workflows/{id}/issues/single - regenerate one task's draft.
pub async fn generate_single_issue(
    scope: Scope,
    Path(id): Path<String>,
    Json(body): Json<SingleIssueRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let resources = scope.0;
    let workflow_id = parse_workflow_id(&id)?;
    let state = load_workflow(&resources, &workflow_id).await?;
    let config = resources.config().await;

    generator::generate_single(&resources.drafts, &state, &body.task_id, &config.issues).await?;
    Ok(Json(serde_json::json!({ "generated": 1, "task_id": body.task_id })))
}

/// POST /api/v1/workflows/{id}/issues/files - drafts from report artifacts.
pub async fn generate_issues_from_files(
    scope: Scope,
    Path(id): Path<String>,
    Json(body): Json<FilesIssueRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let resources = scope.0;
    let workflow_id = parse_workflow_id(&id)?;
    let state = load_workflow(&resources, &workflow_id).await?;
    let config = resources.config().await;

    if body.files.is_empty() {
        return Err(ApiError::BadRequest("no files given".to_string()));
    }

    let mut written = 0u32;
    for file in &body.files {
        // Reuse the project path rules relative to the report directory.
        let rel = format!("{}/{}", state.report_path.trim_end_matches('/'), file);
        let path = resources.layout.resolve_path(&rel)?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ApiError::NotFound(format!("artifact '{file}' not found: {e}")))?;
        let stem = std::path::Path::new(file)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("artifact")
            .to_string();
        let draft = IssueDraft {
            frontmatter: quorum_types::issue::DraftFrontmatter {
                title: stem.clone(),
                labels: config.issues.labels.clone(),
                assignees: Vec::new(),
                is_main_issue: false,
                task_id: None,
                status: DraftStatus::Draft,
            },
            body: content,
        };
        resources.drafts.write(&workflow_id, &stem, &draft).await?;
        written += 1;
    }
    Ok(Json(serde_json::json!({ "generated": written })))
}

// ---------------------------------------------------------------------------
// Preview and drafts
// ---------------------------------------------------------------------------

/// GET /api/v1/workflows/{id}/issues/preview?fast=bool - compose drafts in
/// memory without writing; fast previews omit bodies.
pub async fn preview_issues(
    scope: Scope,
    Path(id): Path<String>,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<Vec<DraftView>>, ApiError> {
    let resources = scope.0;
    let workflow_id = parse_workflow_id(&id)?;
    let state = load_workflow(&resources, &workflow_id).await?;
    let config = resources.config().await;

    let mut views = vec![DraftView::from_draft(
        MAIN_DRAFT,
        &generator::main_draft(&state, &config.issues),
        !query.fast,
    )];
    for task in state.tasks_in_order() {
        views.push(DraftView::from_draft(
            &task.id,
            &generator::task_draft(&state, task, &config.issues),
            !query.fast,
        ));
    }
    Ok(Json(views))
}

/// GET /api/v1/workflows/{id}/issues/drafts - all stored drafts.
pub async fn list_drafts(
    scope: Scope,
    Path(id): Path<String>,
) -> Result<Json<Vec<DraftView>>, ApiError> {
    let workflow_id = parse_workflow_id(&id)?;
    let drafts = scope.0.drafts.list(&workflow_id).await?;
    Ok(Json(
        drafts
            .iter()
            .map(|(name, draft)| DraftView::from_draft(name, draft, true))
            .collect(),
    ))
}

/// GET /api/v1/workflows/{id}/issues/drafts/{taskId} - one stored draft.
pub async fn get_draft(
    scope: Scope,
    Path((id, task_id)): Path<(String, String)>,
) -> Result<Json<DraftView>, ApiError> {
    let workflow_id = parse_workflow_id(&id)?;
    let draft = scope
        .0
        .drafts
        .read(&workflow_id, &task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("draft '{task_id}' not found")))?;
    Ok(Json(DraftView::from_draft(&task_id, &draft, true)))
}

/// PUT /api/v1/workflows/{id}/issues/drafts/{taskId} - edit a stored draft.
pub async fn update_draft(
    scope: Scope,
    Path((id, task_id)): Path<(String, String)>,
    Json(body): Json<UpdateDraftRequest>,
) -> Result<Json<DraftView>, ApiError> {
    let resources = scope.0;
    let workflow_id = parse_workflow_id(&id)?;
    let mut draft = resources
        .drafts
        .read(&workflow_id, &task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("draft '{task_id}' not found")))?;

    if let Some(title) = body.title {
        draft.frontmatter.title = title;
    }
    if let Some(new_body) = body.body {
        draft.body = new_body;
    }
    if let Some(labels) = body.labels {
        draft.frontmatter.labels = labels;
    }
    if let Some(assignees) = body.assignees {
        draft.frontmatter.assignees = assignees;
    }
    if let Some(status) = body.status {
        draft.frontmatter.status = status;
    }

    resources.drafts.write(&workflow_id, &task_id, &draft).await?;
    Ok(Json(DraftView::from_draft(&task_id, &draft, true)))
}

// ---------------------------------------------------------------------------
// Publish and status
// ---------------------------------------------------------------------------

/// POST /api/v1/workflows/{id}/issues/publish - publish unpublished drafts.
pub async fn publish_issues(
    scope: Scope,
    Path(id): Path<String>,
    body: Option<Json<PublishRequest>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let resources = scope.0;
    let workflow_id = parse_workflow_id(&id)?;
    load_workflow(&resources, &workflow_id).await?;
    let config = resources.config().await;
    let request = body.map(|Json(b)| b).unwrap_or(PublishRequest {
        repository: None,
        provider: None,
    });

    let provider_name = request
        .provider
        .unwrap_or_else(|| config.issues.provider.clone());
    match IssueProvider::parse(&provider_name)? {
        IssueProvider::GitLab => return Err(IssueError::GitLabUnsupported.into()),
        IssueProvider::GitHub => {}
    }

    let repository = request
        .repository
        .or_else(|| config.issues.repository.clone())
        .ok_or_else(|| ApiError::BadRequest("no repository configured".to_string()))?;
    validate_repository(&repository)?;

    let drafts = resources.drafts.list(&workflow_id).await?;
    let pending: Vec<&(String, IssueDraft)> = drafts
        .iter()
        .filter(|(_, d)| d.frontmatter.status != DraftStatus::Published)
        .collect();
    let total = pending.len() as u32;

    let publisher = GhCliPublisher;
    let mut published = 0u32;
    let mut urls = Vec::new();
    for (name, draft) in pending {
        let issue = publisher.publish(&repository, draft).await?;
        resources
            .drafts
            .set_status(&workflow_id, name, DraftStatus::Published)
            .await?;
        published += 1;
        urls.push(issue.url);
        resources.bus.publish(WorkflowEvent::IssuesPublishingProgress {
            workflow_id: workflow_id.clone(),
            completed: published,
            total,
            message: format!("published {published}/{total} issues"),
        });
    }

    Ok(Json(serde_json::json!({
        "published": published,
        "repository": repository,
        "urls": urls,
    })))
}

/// GET /api/v1/workflows/{id}/issues/status - draft counts by status.
pub async fn issues_status(
    scope: Scope,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let workflow_id = parse_workflow_id(&id)?;
    let drafts = scope.0.drafts.list(&workflow_id).await?;

    let mut counts: HashMap<&'static str, u32> = HashMap::new();
    for (_, draft) in &drafts {
        let key = match draft.frontmatter.status {
            DraftStatus::Draft => "draft",
            DraftStatus::Ready => "ready",
            DraftStatus::Published => "published",
            DraftStatus::Failed => "failed",
        };
        *counts.entry(key).or_default() += 1;
    }

    Ok(Json(serde_json::json!({
        "total": drafts.len(),
        "by_status": counts,
    })))
}

async fn load_workflow(
    resources: &crate::state::ProjectResources,
    id: &WorkflowId,
) -> Result<WorkflowState, ApiError> {
    resources
        .store
        .load(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("workflow not found".to_string()))
}
