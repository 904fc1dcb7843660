//! Request-scoped project resolution.
//!
//! The `Scope` extractor picks the project from the `X-Quorum-Project`
//! header or the `project` query parameter, falling back to the server's
//! default project, and yields that project's resource bundle. Handlers
//! never touch a global store directly, so multi-project servers cannot leak
//! state across projects.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::http::error::ApiError;
use crate::state::{AppState, ProjectResources};

/// Header naming the target project.
pub const PROJECT_HEADER: &str = "x-quorum-project";

/// Extractor carrying the resolved per-project resources.
pub struct Scope(pub Arc<ProjectResources>);

impl FromRequestParts<AppState> for Scope {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let project_id = project_id_from_parts(parts)
            .unwrap_or_else(|| state.default_project().to_string());
        state.resources(&project_id).await.map(Scope)
    }
}

fn project_id_from_parts(parts: &Parts) -> Option<String> {
    if let Some(header) = parts
        .headers
        .get(PROJECT_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        let header = header.trim();
        if !header.is_empty() {
            return Some(header.to_string());
        }
    }

    parts.uri.query().and_then(|query| {
        query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == "project" && !value.is_empty()).then(|| value.to_string())
        })
    })
}
