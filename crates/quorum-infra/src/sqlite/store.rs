//! SQLite workflow store implementation.
//!
//! Implements `WorkflowStore` from `quorum-core` using sqlx with split
//! read/write pools. The full state is stored as a JSON blob; status, phase,
//! prompt, timestamps, and Kanban placement are extracted into columns for
//! the queries the core depends on. The blob is authoritative on load.

use chrono::Utc;
use quorum_core::store::{KanbanBoard, WorkflowStore};
use quorum_types::error::StoreError;
use quorum_types::id::WorkflowId;
use quorum_types::workflow::{KanbanColumn, WorkflowState, WorkflowStatus};
use sqlx::Row;

use super::pool::DatabasePool;

const ACTIVE_POINTER_KEY: &str = "active_workflow_id";
const ENGINE_STATE_KEY: &str = "kanban_engine_state";

/// SQLite-backed implementation of `WorkflowStore`, one per project.
pub struct SqliteWorkflowStore {
    pool: DatabasePool,
}

impl SqliteWorkflowStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    fn decode(raw: &str) -> Result<WorkflowState, StoreError> {
        serde_json::from_str(raw)
            .map_err(|e| StoreError::Query(format!("invalid workflow state JSON: {e}")))
    }

    async fn fetch_states(&self, query: &str, bind: Option<&str>) -> Result<Vec<WorkflowState>, StoreError> {
        let mut q = sqlx::query(query);
        if let Some(value) = bind {
            q = q.bind(value);
        }
        let rows = q
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        rows.iter()
            .map(|row| {
                let raw: String = row
                    .try_get("state")
                    .map_err(|e| StoreError::Query(e.to_string()))?;
                Self::decode(&raw)
            })
            .collect()
    }

    async fn meta_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT value FROM project_meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        row.map(|r| r.try_get("value").map_err(|e| StoreError::Query(e.to_string())))
            .transpose()
    }

    async fn meta_set(&self, key: &str, value: Option<&str>) -> Result<(), StoreError> {
        match value {
            Some(value) => {
                sqlx::query(
                    "INSERT INTO project_meta (key, value) VALUES (?, ?)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                )
                .bind(key)
                .bind(value)
                .execute(&self.pool.writer)
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?;
            }
            None => {
                sqlx::query("DELETE FROM project_meta WHERE key = ?")
                    .bind(key)
                    .execute(&self.pool.writer)
                    .await
                    .map_err(|e| StoreError::Query(e.to_string()))?;
            }
        }
        Ok(())
    }
}

impl WorkflowStore for SqliteWorkflowStore {
    async fn load(&self, id: &WorkflowId) -> Result<Option<WorkflowState>, StoreError> {
        let row = sqlx::query("SELECT state FROM workflows WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        match row {
            Some(row) => {
                let raw: String = row
                    .try_get("state")
                    .map_err(|e| StoreError::Query(e.to_string()))?;
                Ok(Some(Self::decode(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, state: &mut WorkflowState) -> Result<(), StoreError> {
        state.updated_at = Utc::now();
        let blob = serde_json::to_string(state)
            .map_err(|e| StoreError::Query(format!("serialize workflow state: {e}")))?;

        sqlx::query(
            r#"INSERT INTO workflows
                 (id, prompt, status, current_phase, kanban_column, kanban_position,
                  created_at, updated_at, heartbeat_at, state)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 prompt = excluded.prompt,
                 status = excluded.status,
                 current_phase = excluded.current_phase,
                 kanban_column = excluded.kanban_column,
                 kanban_position = excluded.kanban_position,
                 updated_at = excluded.updated_at,
                 heartbeat_at = excluded.heartbeat_at,
                 state = excluded.state"#,
        )
        .bind(state.id.as_str())
        .bind(&state.prompt)
        .bind(state.status.as_str())
        .bind(state.current_phase.as_str())
        .bind(state.kanban_column.as_str())
        .bind(state.kanban_position)
        .bind(state.created_at.to_rfc3339())
        .bind(state.updated_at.to_rfc3339())
        .bind(state.heartbeat_at.map(|t| t.to_rfc3339()))
        .bind(&blob)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<WorkflowState>, StoreError> {
        self.fetch_states(
            "SELECT state FROM workflows ORDER BY created_at DESC, id DESC",
            None,
        )
        .await
    }

    async fn find_by_prompt(&self, prompt: &str) -> Result<Vec<WorkflowState>, StoreError> {
        self.fetch_states(
            "SELECT state FROM workflows WHERE prompt = ? ORDER BY created_at DESC, id DESC",
            Some(prompt),
        )
        .await
    }

    async fn active_workflow_id(&self) -> Result<Option<WorkflowId>, StoreError> {
        Ok(self
            .meta_get(ACTIVE_POINTER_KEY)
            .await?
            .map(WorkflowId::from_string))
    }

    async fn set_active_workflow_id(&self, id: Option<&WorkflowId>) -> Result<(), StoreError> {
        self.meta_set(ACTIVE_POINTER_KEY, id.map(|i| i.as_str())).await
    }

    async fn delete(&self, id: &WorkflowId) -> Result<(), StoreError> {
        let row = sqlx::query("SELECT status FROM workflows WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
            .ok_or(StoreError::NotFound)?;
        let status: String = row
            .try_get("status")
            .map_err(|e| StoreError::Query(e.to_string()))?;
        if WorkflowStatus::parse(&status) == Some(WorkflowStatus::Running) {
            return Err(StoreError::Conflict(
                "cannot delete a running workflow".to_string(),
            ));
        }

        sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        // Drop a dangling active pointer.
        if self.meta_get(ACTIVE_POINTER_KEY).await?.as_deref() == Some(id.as_str()) {
            self.meta_set(ACTIVE_POINTER_KEY, None).await?;
        }
        Ok(())
    }

    async fn touch_heartbeat(&self, id: &WorkflowId) -> Result<(), StoreError> {
        let mut state = self.load(id).await?.ok_or(StoreError::NotFound)?;
        state.heartbeat_at = Some(Utc::now());
        self.save(&mut state).await
    }

    async fn board(&self) -> Result<KanbanBoard, StoreError> {
        let mut board = KanbanBoard::default();
        for state in self.list().await? {
            board
                .columns
                .entry(state.kanban_column)
                .or_default()
                .push(state);
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
        let mut state = self.load(id).await?.ok_or(StoreError::NotFound)?;
        state.kanban_column = column;
        state.kanban_position = position;
        self.save(&mut state).await
    }

    async fn engine_state(&self) -> Result<Option<serde_json::Value>, StoreError> {
        self.meta_get(ENGINE_STATE_KEY)
            .await?
            .map(|raw| {
                serde_json::from_str(&raw)
                    .map_err(|e| StoreError::Query(format!("invalid engine state JSON: {e}")))
            })
            .transpose()
    }

    async fn save_engine_state(&self, value: &serde_json::Value) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)
            .map_err(|e| StoreError::Query(format!("serialize engine state: {e}")))?;
        self.meta_set(ENGINE_STATE_KEY, Some(&raw)).await
    }
}
