//! Error taxonomy shared across the workspace.
//!
//! Module-level thiserror enums cover each subsystem; `DomainError` is the
//! API-facing shape carrying a stable code and a category that a single
//! function maps to an HTTP status.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Domain error taxonomy
// ---------------------------------------------------------------------------

/// Coarse error category, mapped 1:1 to an HTTP status by the API layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input. 422 (or 400 for malformed requests).
    Validation,
    /// Entity missing. 404.
    NotFound,
    /// Admission or state-machine violation. 409.
    Conflict,
    /// External-service credentials missing. 401.
    Auth,
    /// External service throttled us. 429.
    RateLimit,
    /// Execution deadline exceeded. 504.
    Timeout,
    /// Anything else. 500.
    Internal,
}

/// An error with a stable machine-readable code and a category.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DomainError {
    pub code: String,
    pub category: ErrorCategory,
    pub message: String,
}

impl DomainError {
    pub fn new(
        code: impl Into<String>,
        category: ErrorCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            category,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", ErrorCategory::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", ErrorCategory::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", ErrorCategory::Conflict, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", ErrorCategory::Internal, message)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Errors from workflow store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("workflow not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

// ---------------------------------------------------------------------------
// Control plane and tracker
// ---------------------------------------------------------------------------

/// Precise control-dispatch failures surfaced verbatim to API callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("workflow is not running")]
    NotRunning,

    #[error("workflow is already paused")]
    AlreadyPaused,

    #[error("workflow is not paused")]
    NotPaused,

    #[error("workflow is already being cancelled")]
    AlreadyCancelling,
}

/// Errors from the unified execution tracker.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// A handle already exists, or the persisted row says running.
    #[error("execution already in progress")]
    AlreadyRunning,

    #[error("workflow not found")]
    NotFound,

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// The spawned execution never confirmed within the bound.
    #[error("timed out waiting for execution start confirmation")]
    ConfirmTimeout,

    #[error("conflict: {0}")]
    Conflict(String),
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Errors a workflow runner returns; persisted on the state, never surfaced
/// as an HTTP error to the caller that started the run.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("workflow cancelled during {phase}")]
    Cancelled { phase: String },

    /// The persisted row was failed underneath us (sweeper or force-stop);
    /// the runner must abort without resurrecting the status.
    #[error("workflow was terminated externally")]
    Terminated,

    #[error("agent '{agent}' failed: {message}")]
    Agent { agent: String, message: String },

    #[error("consensus score {score:.2} below threshold {threshold:.2}")]
    ConsensusBelowThreshold { score: f64, threshold: f64 },

    #[error("resume limit exceeded ({max} resumes)")]
    ResumeLimitExceeded { max: u32 },

    #[error("execution timed out")]
    Timeout,

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("artifact error: {0}")]
    Artifact(String),
}

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

/// Stable code attached to GitHub CLI authentication failures.
pub const GH_NOT_AUTHENTICATED: &str = "GH_NOT_AUTHENTICATED";

/// Errors from the issue-generation pipeline.
#[derive(Debug, Error)]
pub enum IssueError {
    #[error("GitHub CLI is not authenticated. Run `gh auth login` to authenticate.")]
    NotAuthenticated,

    #[error("invalid repository format: '{0}' (expected owner/repo)")]
    InvalidRepository(String),

    #[error("unknown issue provider: '{0}'")]
    UnknownProvider(String),

    #[error("gitlab provider is not implemented")]
    GitLabUnsupported,

    #[error("rate limited by issue provider: {0}")]
    RateLimited(String),

    #[error("draft error: {0}")]
    Draft(String),

    #[error("publish failed: {0}")]
    Publish(String),
}

impl IssueError {
    /// Convert to the API-facing taxonomy with the right code/category.
    pub fn to_domain(&self) -> DomainError {
        match self {
            Self::NotAuthenticated => {
                DomainError::new(GH_NOT_AUTHENTICATED, ErrorCategory::Auth, self.to_string())
            }
            Self::InvalidRepository(_) | Self::UnknownProvider(_) => {
                DomainError::validation(self.to_string())
            }
            Self::RateLimited(_) => {
                DomainError::new("RATE_LIMITED", ErrorCategory::RateLimit, self.to_string())
            }
            Self::GitLabUnsupported | Self::Draft(_) | Self::Publish(_) => {
                DomainError::internal(self.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_error_phrases_are_exact() {
        assert_eq!(ControlError::NotRunning.to_string(), "workflow is not running");
        assert_eq!(
            ControlError::AlreadyPaused.to_string(),
            "workflow is already paused"
        );
        assert_eq!(ControlError::NotPaused.to_string(), "workflow is not paused");
        assert_eq!(
            ControlError::AlreadyCancelling.to_string(),
            "workflow is already being cancelled"
        );
    }

    #[test]
    fn tracker_already_running_phrase() {
        assert_eq!(
            TrackerError::AlreadyRunning.to_string(),
            "execution already in progress"
        );
    }

    #[test]
    fn gh_auth_error_maps_to_auth_category() {
        let domain = IssueError::NotAuthenticated.to_domain();
        assert_eq!(domain.code, GH_NOT_AUTHENTICATED);
        assert_eq!(domain.category, ErrorCategory::Auth);
        assert!(domain.message.contains("gh auth login"));
    }

    #[test]
    fn runner_error_display() {
        let err = RunnerError::ConsensusBelowThreshold {
            score: 0.5,
            threshold: 0.75,
        };
        assert!(err.to_string().contains("0.50"));
        assert!(err.to_string().contains("0.75"));
    }
}
