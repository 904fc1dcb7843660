//! Sandboxed project file access.
//!
//! Reads and writes are confined to the project root by the layout's path
//! resolver: no traversal, no dotfile secrets, nothing under `.quorum/`
//! except workflow artifacts. Violations are 403.

use axum::extract::Query;
use axum::Json;
use serde::Deserialize;

use crate::http::error::ApiError;
use crate::project::Scope;

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct WriteFileRequest {
    pub path: String,
    pub content: String,
}

/// GET /api/v1/files?path=rel - read one file inside the project root.
pub async fn read_file(
    scope: Scope,
    Query(query): Query<FileQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let resolved = scope.0.layout.resolve_path(&query.path)?;
    let content = tokio::fs::read_to_string(&resolved)
        .await
        .map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => {
                ApiError::NotFound(format!("file '{}' not found", query.path))
            }
            _ => ApiError::Internal(err.to_string()),
        })?;
    Ok(Json(serde_json::json!({
        "path": query.path,
        "content": content,
    })))
}

/// PUT /api/v1/files - write one file inside the project root, creating
/// parent directories as needed.
pub async fn write_file(
    scope: Scope,
    Json(body): Json<WriteFileRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let resolved = scope.0.layout.resolve_path(&body.path)?;
    if let Some(parent) = resolved.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| ApiError::Internal(err.to_string()))?;
    }
    tokio::fs::write(&resolved, body.content.as_bytes())
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok(Json(serde_json::json!({
        "path": body.path,
        "written": body.content.len(),
    })))
}
