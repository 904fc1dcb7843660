//! Application error type mapping the domain taxonomy to HTTP responses.
//!
//! Error bodies are `{"error": "..."}` everywhere except validation, which
//! uses the 422 envelope `{message, errors: [{field, message, code}]}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use quorum_infra::archive::ArchiveError;
use quorum_infra::project::PathError;
use quorum_types::error::{
    ControlError, DomainError, ErrorCategory, IssueError, StoreError, TrackerError,
};

/// One field-level validation failure in a 422 body.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    pub code: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>, code: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
            code: code.to_string(),
        }
    }
}

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 malformed request.
    BadRequest(String),
    /// 401 external-service credentials missing.
    Unauthorized(String),
    /// 403 path-safety violation.
    Forbidden(String),
    /// 404 entity missing.
    NotFound(String),
    /// 409 admission or state-machine violation.
    Conflict(String),
    /// 422 validation failure with field details.
    Validation {
        message: String,
        errors: Vec<FieldError>,
    },
    /// 429 throttled by an external service.
    RateLimited(String),
    /// 501 provider not implemented.
    NotImplemented(String),
    /// 503 a project-scoped service is unavailable.
    Unavailable(String),
    /// 504 execution deadline exceeded.
    Timeout(String),
    /// 500 anything else.
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>, errors: Vec<FieldError>) -> Self {
        Self::Validation {
            message: message.into(),
            errors,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::Validation { message, errors } => {
                (status, Json(json!({ "message": message, "errors": errors }))).into_response()
            }
            Self::BadRequest(message)
            | Self::Unauthorized(message)
            | Self::Forbidden(message)
            | Self::NotFound(message)
            | Self::Conflict(message)
            | Self::RateLimited(message)
            | Self::NotImplemented(message)
            | Self::Unavailable(message)
            | Self::Timeout(message)
            | Self::Internal(message) => {
                (status, Json(json!({ "error": message }))).into_response()
            }
        }
    }
}

/// The single category-to-status mapping for domain errors.
impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err.category {
            ErrorCategory::Validation => ApiError::Validation {
                message: err.message,
                errors: Vec::new(),
            },
            ErrorCategory::NotFound => ApiError::NotFound(err.message),
            ErrorCategory::Conflict => ApiError::Conflict(err.message),
            ErrorCategory::Auth => ApiError::Unauthorized(err.message),
            ErrorCategory::RateLimit => ApiError::RateLimited(err.message),
            ErrorCategory::Timeout => ApiError::Timeout(err.message),
            ErrorCategory::Internal => ApiError::Internal(err.message),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound("workflow not found".to_string()),
            StoreError::Conflict(message) => ApiError::Conflict(message),
            StoreError::Connection => {
                ApiError::Unavailable("state management unavailable".to_string())
            }
            StoreError::Query(message) => ApiError::Internal(message),
        }
    }
}

impl From<TrackerError> for ApiError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::AlreadyRunning => ApiError::Conflict(err.to_string()),
            TrackerError::NotFound => ApiError::NotFound("workflow not found".to_string()),
            TrackerError::Control(control) => ApiError::from(control),
            TrackerError::Store(store) => ApiError::from(store),
            TrackerError::ConfirmTimeout => ApiError::Internal(err.to_string()),
            TrackerError::Conflict(message) => ApiError::Conflict(message),
        }
    }
}

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        ApiError::Conflict(err.to_string())
    }
}

impl From<IssueError> for ApiError {
    fn from(err: IssueError) -> Self {
        match err {
            IssueError::GitLabUnsupported => ApiError::NotImplemented(err.to_string()),
            IssueError::InvalidRepository(_) | IssueError::UnknownProvider(_) => {
                ApiError::BadRequest(err.to_string())
            }
            other => ApiError::from(other.to_domain()),
        }
    }
}

impl From<PathError> for ApiError {
    fn from(err: PathError) -> Self {
        ApiError::Forbidden(err.to_string())
    }
}

impl From<ArchiveError> for ApiError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::NotFound => {
                ApiError::NotFound("report directory missing".to_string())
            }
            ArchiveError::Io(message) => ApiError::Internal(message),
        }
    }
}
