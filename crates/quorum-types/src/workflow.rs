//! Workflow execution state: the authoritative per-workflow record.
//!
//! A `WorkflowState` couples an immutable definition section (prompt,
//! blueprint, creation time) with the mutable run section (status, phase,
//! tasks, metrics, Kanban placement). Status and phase are sum types; their
//! `snake_case` serde form is the wire and storage encoding.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::blueprint::Blueprint;
use crate::id::WorkflowId;

/// Format version tag written into every persisted state.
pub const STATE_VERSION: &str = "1";

/// Default cap on resume attempts before a workflow fails permanently.
pub const DEFAULT_MAX_RESUMES: u32 = 3;

// ---------------------------------------------------------------------------
// Status and phase
// ---------------------------------------------------------------------------

/// Overall lifecycle status of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

impl WorkflowStatus {
    /// True for statuses a new execution may start from.
    pub fn is_startable(self) -> bool {
        matches!(self, Self::Pending | Self::Failed | Self::Paused)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The stage a run is currently in (or will enter next).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    Refine,
    Analyze,
    Plan,
    Execute,
}

impl WorkflowPhase {
    /// The phase that follows this one, or `None` after execute.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Refine => Some(Self::Analyze),
            Self::Analyze => Some(Self::Plan),
            Self::Plan => Some(Self::Execute),
            Self::Execute => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Refine => "refine",
            Self::Analyze => "analyze",
            Self::Plan => "plan",
            Self::Execute => "execute",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "refine" => Some(Self::Refine),
            "analyze" => Some(Self::Analyze),
            "plan" => Some(Self::Plan),
            "execute" => Some(Self::Execute),
            _ => None,
        }
    }
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kanban board placement. An empty stored column reads as `Refinement`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KanbanColumn {
    #[default]
    Refinement,
    Todo,
    InProgress,
    ToVerify,
    Done,
}

impl KanbanColumn {
    pub const ALL: [KanbanColumn; 5] = [
        Self::Refinement,
        Self::Todo,
        Self::InProgress,
        Self::ToVerify,
        Self::Done,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Refinement => "refinement",
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::ToVerify => "to_verify",
            Self::Done => "done",
        }
    }

    /// Parse a stored column name; empty maps to the default column.
    pub fn parse_or_default(raw: &str) -> Option<Self> {
        match raw {
            "" | "refinement" => Some(Self::Refinement),
            "todo" => Some(Self::Todo),
            "in_progress" => Some(Self::InProgress),
            "to_verify" => Some(Self::ToVerify),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

impl fmt::Display for KanbanColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Status of a single planned task within the execute phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// A unit of work produced by planning and consumed by the execute phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskState {
    pub fn new(id: impl Into<String>, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Checkpoints, metrics, agent events
// ---------------------------------------------------------------------------

/// A durable marker written at phase boundaries, used to resume partial runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub phase: WorkflowPhase,
    pub label: String,
    pub created_at: DateTime<Utc>,
}

/// Token accounting and consensus score for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowMetrics {
    #[serde(default)]
    pub tokens_in: u64,
    #[serde(default)]
    pub tokens_out: u64,
    #[serde(default)]
    pub consensus_score: f64,
}

/// Append-only record of one agent interaction during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEventRecord {
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    pub phase: WorkflowPhase,
    pub message: String,
}

// ---------------------------------------------------------------------------
// WorkflowState
// ---------------------------------------------------------------------------

/// The authoritative record for one workflow.
///
/// The definition section (`version` through `created_at`) never changes
/// after creation; the rest is the run section, owned by whichever process
/// holds the execution handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    // Definition
    pub version: String,
    pub id: WorkflowId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub prompt: String,
    pub blueprint: Blueprint,
    pub created_at: DateTime<Utc>,

    // Run
    pub status: WorkflowStatus,
    pub current_phase: WorkflowPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Artifact directory, relative to the project root.
    #[serde(default)]
    pub report_path: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resume_count: u32,
    #[serde(default = "default_max_resumes")]
    pub max_resumes: u32,
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
    #[serde(default)]
    pub metrics: WorkflowMetrics,
    #[serde(default)]
    pub tasks: HashMap<String, TaskState>,
    #[serde(default)]
    pub task_order: Vec<String>,
    #[serde(default)]
    pub agent_events: Vec<AgentEventRecord>,
    #[serde(default)]
    pub kanban_column: KanbanColumn,
    #[serde(default)]
    pub kanban_position: i64,
    #[serde(default)]
    pub execution_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

fn default_max_resumes() -> u32 {
    DEFAULT_MAX_RESUMES
}

impl WorkflowState {
    /// Create a pending workflow with a freshly generated ID.
    pub fn new(prompt: impl Into<String>, title: Option<String>, blueprint: Blueprint) -> Self {
        let id = WorkflowId::generate();
        let now = Utc::now();
        let report_path = format!(".quorum/runs/{id}");
        let first_phase = if blueprint.refine {
            WorkflowPhase::Refine
        } else {
            WorkflowPhase::Analyze
        };
        Self {
            version: STATE_VERSION.to_string(),
            id,
            title,
            prompt: prompt.into(),
            blueprint,
            created_at: now,
            status: WorkflowStatus::Pending,
            current_phase: first_phase,
            error: None,
            report_path,
            updated_at: now,
            heartbeat_at: None,
            resume_count: 0,
            max_resumes: DEFAULT_MAX_RESUMES,
            checkpoints: Vec::new(),
            metrics: WorkflowMetrics::default(),
            tasks: HashMap::new(),
            task_order: Vec::new(),
            agent_events: Vec::new(),
            kanban_column: KanbanColumn::Refinement,
            kanban_position: 0,
            execution_count: 0,
            last_error: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Tasks in their planned order. Tasks missing from `task_order` (which
    /// would violate the permutation invariant) are skipped.
    pub fn tasks_in_order(&self) -> Vec<&TaskState> {
        self.task_order
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .collect()
    }

    /// Insert a task, keeping `task_order` a permutation of the task keys.
    pub fn push_task(&mut self, task: TaskState) {
        if !self.tasks.contains_key(&task.id) {
            self.task_order.push(task.id.clone());
        }
        self.tasks.insert(task.id.clone(), task);
    }

    /// Drop all planning output: tasks, their ordering, and metrics.
    pub fn clear_plan(&mut self) {
        self.tasks.clear();
        self.task_order.clear();
        self.metrics = WorkflowMetrics::default();
    }

    /// Append a checkpoint for the given phase.
    pub fn add_checkpoint(&mut self, phase: WorkflowPhase, label: impl Into<String>) {
        self.checkpoints.push(Checkpoint {
            phase,
            label: label.into(),
            created_at: Utc::now(),
        });
    }

    /// Verify `task_order` is a permutation of the task map keys.
    pub fn task_order_consistent(&self) -> bool {
        self.task_order.len() == self.tasks.len()
            && self.task_order.iter().all(|id| self.tasks.contains_key(id))
    }

    /// Whether the heartbeat is older than `stale_after` (a missing
    /// heartbeat counts as stale).
    pub fn heartbeat_stale(&self, now: DateTime<Utc>, stale_after: chrono::Duration) -> bool {
        match self.heartbeat_at {
            Some(hb) => now.signed_duration_since(hb) > stale_after,
            None => true,
        }
    }
}
