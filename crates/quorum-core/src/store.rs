//! Workflow store contract.
//!
//! Defines the persistence interface the execution core depends on. The
//! infrastructure layer (quorum-infra) implements it with SQLite, one
//! database per project. All operations are atomic at the single-row level;
//! `save` is last-writer-wins, and the core only read-modify-writes a row
//! while it holds the execution handle for it.
//!
//! Uses native async fn in traits (Rust 2024 edition, no async_trait macro).

use std::collections::HashMap;

use quorum_types::error::StoreError;
use quorum_types::id::WorkflowId;
use quorum_types::workflow::{KanbanColumn, WorkflowState};

/// The Kanban board: workflows grouped by column, ordered by position.
#[derive(Debug, Default)]
pub struct KanbanBoard {
    pub columns: HashMap<KanbanColumn, Vec<WorkflowState>>,
}

impl KanbanBoard {
    /// Workflows in one column, empty slice when the column has none.
    pub fn column(&self, column: KanbanColumn) -> &[WorkflowState] {
        self.columns.get(&column).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Persisted workflow store, scoped to a single project.
pub trait WorkflowStore: Send + Sync {
    /// Load a workflow by ID; `None` when absent.
    fn load(
        &self,
        id: &WorkflowId,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowState>, StoreError>> + Send;

    /// Persist a workflow. Overwrites `updated_at` with now.
    fn save(
        &self,
        state: &mut WorkflowState,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// All workflows, newest first, any status.
    fn list(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowState>, StoreError>> + Send;

    /// Byte-exact prompt matches across all statuses (duplicate admission).
    fn find_by_prompt(
        &self,
        prompt: &str,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowState>, StoreError>> + Send;

    /// The per-project active workflow pointer, at most one.
    fn active_workflow_id(
        &self,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowId>, StoreError>> + Send;

    fn set_active_workflow_id(
        &self,
        id: Option<&WorkflowId>,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Hard delete. Fails with a conflict while the workflow is running.
    fn delete(
        &self,
        id: &WorkflowId,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Write `heartbeat_at = now` without touching anything else.
    fn touch_heartbeat(
        &self,
        id: &WorkflowId,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    // -----------------------------------------------------------------------
    // Kanban accessors (consumed by the board subsystem)
    // -----------------------------------------------------------------------

    fn board(
        &self,
    ) -> impl std::future::Future<Output = Result<KanbanBoard, StoreError>> + Send;

    fn move_workflow(
        &self,
        id: &WorkflowId,
        column: KanbanColumn,
        position: i64,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Opaque state blob for the board auto-advance engine.
    fn engine_state(
        &self,
    ) -> impl std::future::Future<Output = Result<Option<serde_json::Value>, StoreError>> + Send;

    fn save_engine_state(
        &self,
        value: &serde_json::Value,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}

// ---------------------------------------------------------------------------
// In-memory store for core tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use chrono::Utc;
    use quorum_types::workflow::WorkflowStatus;
    use tokio::sync::RwLock;

    /// HashMap-backed store used by core unit tests.
    #[derive(Default)]
    pub struct MemoryStore {
        inner: RwLock<Inner>,
    }

    #[derive(Default)]
    struct Inner {
        workflows: Vec<WorkflowState>,
        active: Option<WorkflowId>,
        engine_state: Option<serde_json::Value>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn insert(&self, state: WorkflowState) {
            self.inner.write().await.workflows.push(state);
        }
    }

    impl WorkflowStore for MemoryStore {
        async fn load(&self, id: &WorkflowId) -> Result<Option<WorkflowState>, StoreError> {
            Ok(self
                .inner
                .read()
                .await
                .workflows
                .iter()
                .find(|w| &w.id == id)
                .cloned())
        }

        async fn save(&self, state: &mut WorkflowState) -> Result<(), StoreError> {
            state.updated_at = Utc::now();
            let mut inner = self.inner.write().await;
            match inner.workflows.iter_mut().find(|w| w.id == state.id) {
                Some(slot) => *slot = state.clone(),
                None => inner.workflows.push(state.clone()),
            }
            Ok(())
        }

        async fn list(&self) -> Result<Vec<WorkflowState>, StoreError> {
            let mut all = self.inner.read().await.workflows.clone();
            all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(all)
        }

        async fn find_by_prompt(&self, prompt: &str) -> Result<Vec<WorkflowState>, StoreError> {
            Ok(self
                .inner
                .read()
                .await
                .workflows
                .iter()
                .filter(|w| w.prompt == prompt)
                .cloned()
                .collect())
        }

        async fn active_workflow_id(&self) -> Result<Option<WorkflowId>, StoreError> {
            Ok(self.inner.read().await.active.clone())
        }

        async fn set_active_workflow_id(
            &self,
            id: Option<&WorkflowId>,
        ) -> Result<(), StoreError> {
            self.inner.write().await.active = id.cloned();
            Ok(())
        }

        async fn delete(&self, id: &WorkflowId) -> Result<(), StoreError> {
            let mut inner = self.inner.write().await;
            let Some(pos) = inner.workflows.iter().position(|w| &w.id == id) else {
                return Err(StoreError::NotFound);
            };
            if inner.workflows[pos].status == WorkflowStatus::Running {
                return Err(StoreError::Conflict(
                    "cannot delete a running workflow".to_string(),
                ));
            }
            inner.workflows.remove(pos);
            Ok(())
        }

        async fn touch_heartbeat(&self, id: &WorkflowId) -> Result<(), StoreError> {
            let mut inner = self.inner.write().await;
            let wf = inner
                .workflows
                .iter_mut()
                .find(|w| &w.id == id)
                .ok_or(StoreError::NotFound)?;
            wf.heartbeat_at = Some(Utc::now());
            Ok(())
        }

        async fn board(&self) -> Result<KanbanBoard, StoreError> {
            let mut board = KanbanBoard::default();
            for wf in self.inner.read().await.workflows.iter() {
                board
                    .columns
                    .entry(wf.kanban_column)
                    .or_default()
                    .push(wf.clone());
            }
            for entries in board.columns.values_mut() {
                entries.sort_by_key(|w| w.kanban_position);
            }
            Ok(board)
        }

        async fn move_workflow(
            &self,
            id: &WorkflowId,
            column: KanbanColumn,
            position: i64,
        ) -> Result<(), StoreError> {
            let mut inner = self.inner.write().await;
            let wf = inner
                .workflows
                .iter_mut()
                .find(|w| &w.id == id)
                .ok_or(StoreError::NotFound)?;
            wf.kanban_column = column;
            wf.kanban_position = position;
            Ok(())
        }

        async fn engine_state(&self) -> Result<Option<serde_json::Value>, StoreError> {
            Ok(self.inner.read().await.engine_state.clone())
        }

        async fn save_engine_state(&self, value: &serde_json::Value) -> Result<(), StoreError> {
            self.inner.write().await.engine_state = Some(value.clone());
            Ok(())
        }
    }
}
