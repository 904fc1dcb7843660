//! Unified execution tracker: the single source of truth for "is this
//! workflow running in this process right now?".
//!
//! Holds the mapping from workflow ID to live `ExecutionHandle` behind an
//! async mutex so the zombie sweep and rollback paths can re-check handle
//! presence and rewrite the persisted row without releasing the lock in
//! between. All map operations themselves are short.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use quorum_types::config::ExecutionConfig;
use quorum_types::error::{ControlError, StoreError, TrackerError};
use quorum_types::id::WorkflowId;
use quorum_types::workflow::{WorkflowState, WorkflowStatus};
use tokio::sync::Mutex;

use crate::store::WorkflowStore;

use super::handle::ExecutionHandle;

/// Error written on rows stopped by the user while no handle existed.
const FORCED_STOP_ERROR: &str = "workflow stopped by forced stop";

/// Tracker for one project's running workflows.
pub struct ExecutionTracker<S> {
    store: Arc<S>,
    handles: Mutex<HashMap<WorkflowId, Arc<ExecutionHandle>>>,
    confirm_timeout: Duration,
    cancel_grace: Duration,
}

impl<S: WorkflowStore + 'static> ExecutionTracker<S> {
    pub fn new(store: Arc<S>, config: &ExecutionConfig) -> Self {
        Self {
            store,
            handles: Mutex::new(HashMap::new()),
            confirm_timeout: config.confirm_timeout(),
            cancel_grace: config.cancel_grace(),
        }
    }

    /// Bound used by handlers waiting on the start-confirmation latch.
    pub fn confirm_timeout(&self) -> Duration {
        self.confirm_timeout
    }

    /// True iff a live handle exists for the workflow.
    pub async fn is_running(&self, id: &WorkflowId) -> bool {
        self.handles.lock().await.contains_key(id)
    }

    /// Atomically admit a new execution.
    ///
    /// Fails fast when a handle already exists or the persisted row says
    /// running. On success the row is rewritten to running with a fresh
    /// heartbeat and cleared error, and a handle carrying the prior status
    /// snapshot is registered and returned.
    pub async fn start_execution(
        &self,
        id: &WorkflowId,
    ) -> Result<Arc<ExecutionHandle>, TrackerError> {
        let mut handles = self.handles.lock().await;
        if handles.contains_key(id) {
            return Err(TrackerError::AlreadyRunning);
        }

        let mut state = self
            .store
            .load(id)
            .await?
            .ok_or(TrackerError::NotFound)?;
        if state.status == WorkflowStatus::Running {
            // Persisted running without a local handle: either another call
            // raced us or the row is a zombie awaiting the sweeper.
            return Err(TrackerError::AlreadyRunning);
        }

        let prior = state.status;
        let now = Utc::now();
        state.status = WorkflowStatus::Running;
        state.heartbeat_at = Some(now);
        state.error = None;
        state.started_at = Some(now);
        state.completed_at = None;
        state.execution_count += 1;
        self.store.save(&mut state).await?;

        let handle = Arc::new(ExecutionHandle::new(id.clone(), prior));
        handles.insert(id.clone(), Arc::clone(&handle));

        tracing::info!(workflow_id = %id, prior_status = %prior, "execution started");
        Ok(handle)
    }

    /// Undo a `start_execution` whose follow-up failed before the execution
    /// task spawned. Drops the handle and restores the row: back to the prior
    /// status, or to failed with `reason` when it was pending.
    pub async fn rollback_execution(&self, id: &WorkflowId, reason: &str) {
        let mut handles = self.handles.lock().await;
        let prior = handles
            .remove(id)
            .map(|h| h.prior_status())
            .unwrap_or(WorkflowStatus::Pending);

        let loaded = match self.store.load(id).await {
            Ok(Some(state)) => state,
            Ok(None) => return,
            Err(err) => {
                tracing::error!(workflow_id = %id, error = %err, "rollback load failed");
                return;
            }
        };

        let mut state = loaded;
        if prior == WorkflowStatus::Pending {
            state.status = WorkflowStatus::Failed;
            state.error = Some(reason.to_string());
            state.last_error = Some(reason.to_string());
        } else {
            state.status = prior;
        }
        if let Err(err) = self.store.save(&mut state).await {
            tracing::error!(workflow_id = %id, error = %err, "rollback save failed");
        } else {
            tracing::warn!(workflow_id = %id, reason, "execution rolled back");
        }
    }

    /// Drop the handle after the runner returns. Never touches status; the
    /// runner owns the terminal state of the row.
    pub async fn finish_execution(&self, id: &WorkflowId) {
        if self.handles.lock().await.remove(id).is_some() {
            tracing::info!(workflow_id = %id, "execution finished");
        }
    }

    /// Pause the running workflow: latch the control plane and persist the
    /// paused status so the board and GETs reflect it.
    pub async fn pause(&self, id: &WorkflowId) -> Result<(), TrackerError> {
        let handles = self.handles.lock().await;
        let handle = handles.get(id).ok_or(ControlError::NotRunning)?;
        if handle.control().is_paused() {
            return Err(ControlError::AlreadyPaused.into());
        }
        handle.control().pause();
        if let Some(mut state) = self.store.load(id).await? {
            if state.status == WorkflowStatus::Running {
                state.status = WorkflowStatus::Paused;
                self.store.save(&mut state).await?;
            }
        }
        tracing::info!(workflow_id = %id, "pause requested");
        Ok(())
    }

    /// Reopen the pause gate and persist the running status.
    pub async fn resume(&self, id: &WorkflowId) -> Result<(), TrackerError> {
        let handles = self.handles.lock().await;
        let handle = handles.get(id).ok_or(ControlError::NotRunning)?;
        if !handle.control().is_paused() {
            return Err(ControlError::NotPaused.into());
        }
        handle.control().resume();
        if let Some(mut state) = self.store.load(id).await? {
            if state.status == WorkflowStatus::Paused {
                state.status = WorkflowStatus::Running;
                state.heartbeat_at = Some(Utc::now());
                self.store.save(&mut state).await?;
            }
        }
        tracing::info!(workflow_id = %id, "resumed");
        Ok(())
    }

    /// Request cooperative cancellation.
    ///
    /// The runner observes the latched flag at its next checkpoint. If it
    /// stops polling, the stored exec cancel fires once the grace period
    /// expires, tearing down external processes via the context.
    pub async fn cancel(&self, id: &WorkflowId) -> Result<(), TrackerError> {
        let handles = self.handles.lock().await;
        let handle = handles.get(id).cloned().ok_or(ControlError::NotRunning)?;
        drop(handles);

        if handle.mark_cancel_requested() {
            return Err(ControlError::AlreadyCancelling.into());
        }
        handle.control().cancel();
        tracing::info!(workflow_id = %id, grace_secs = self.cancel_grace.as_secs(), "cancel requested");

        let grace = self.cancel_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            // Cancelling an already-finished execution's token is a no-op.
            if let Some(token) = handle.exec_cancel() {
                if !token.is_cancelled() {
                    tracing::warn!(
                        workflow_id = %handle.workflow_id(),
                        "cancel grace expired, tearing down execution context"
                    );
                    token.cancel();
                }
            }
        });
        Ok(())
    }

    /// Rewrite a zombie row (persisted running, no handle) to failed.
    /// Idempotent: a row already failed or completed is left alone.
    pub async fn force_stop(&self, id: &WorkflowId) -> Result<(), TrackerError> {
        let mut handles = self.handles.lock().await;
        if let Some(handle) = handles.remove(id) {
            // A live handle makes this the nuclear path: tear everything down.
            handle.control().cancel();
            if let Some(token) = handle.exec_cancel() {
                token.cancel();
            }
        }

        let mut state = self
            .store
            .load(id)
            .await?
            .ok_or(TrackerError::NotFound)?;
        if matches!(
            state.status,
            WorkflowStatus::Running | WorkflowStatus::Paused | WorkflowStatus::Pending
        ) {
            state.status = WorkflowStatus::Failed;
            state.error = Some(FORCED_STOP_ERROR.to_string());
            state.last_error = Some(FORCED_STOP_ERROR.to_string());
            state.completed_at = Some(Utc::now());
            self.store.save(&mut state).await?;
            tracing::warn!(workflow_id = %id, "workflow force-stopped");
        }
        Ok(())
    }

    /// One zombie sweep pass. Returns the number of rows transitioned.
    ///
    /// A row is a zombie when no local handle exists and its heartbeat is
    /// older than `stale_after`. The tracker lock is re-acquired and the row
    /// re-loaded immediately before each write, so a handle created between
    /// the scan and the write shields the row.
    pub async fn sweep_once(
        &self,
        now: DateTime<Utc>,
        stale_after: chrono::Duration,
    ) -> Result<u32, StoreError> {
        let running: Vec<WorkflowState> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|w| w.status == WorkflowStatus::Running)
            .collect();

        let mut swept = 0u32;
        for candidate in running {
            let handles = self.handles.lock().await;
            if handles.contains_key(&candidate.id) {
                continue;
            }
            // Re-load under the lock: the first read raced anything between
            // the list and here.
            let Some(mut fresh) = self.store.load(&candidate.id).await? else {
                continue;
            };
            if fresh.status != WorkflowStatus::Running
                || !fresh.heartbeat_stale(now, stale_after)
            {
                continue;
            }

            let since = fresh
                .heartbeat_at
                .map(|hb| hb.to_rfc3339())
                .unwrap_or_else(|| "never".to_string());
            let error = format!(
                "workflow marked failed by zombie sweeper: stale heartbeat since {since}"
            );
            fresh.status = WorkflowStatus::Failed;
            fresh.error = Some(error.clone());
            fresh.last_error = Some(error);
            fresh.completed_at = Some(now);
            self.store.save(&mut fresh).await?;
            drop(handles);

            tracing::warn!(workflow_id = %candidate.id, "zombie workflow marked failed");
            swept += 1;
        }
        Ok(swept)
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}
