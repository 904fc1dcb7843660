//! In-memory record of a workflow actively running in this process.
//!
//! The handle couples the control plane with the execution context's cancel
//! token and a one-shot start-confirmation latch. The latch closes the window
//! between `start_execution` returning and the spawned task actually running:
//! handlers wait on it before replying 202, so the caller's next poll sees a
//! running status backed by a live task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use quorum_types::error::TrackerError;
use quorum_types::id::WorkflowId;
use quorum_types::workflow::WorkflowStatus;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::control::ControlPlane;

/// Live execution record, owned by the tracker for the life of a run.
#[derive(Debug)]
pub struct ExecutionHandle {
    workflow_id: WorkflowId,
    control: Arc<ControlPlane>,
    exec_cancel: OnceLock<CancellationToken>,
    confirmed: watch::Sender<bool>,
    cancel_requested: AtomicBool,
    /// Status the row held before `start_execution` rewrote it; used to roll
    /// back when a post-start step fails before the task spawns.
    prior_status: WorkflowStatus,
    created_at: DateTime<Utc>,
}

impl ExecutionHandle {
    pub fn new(workflow_id: WorkflowId, prior_status: WorkflowStatus) -> Self {
        let (confirmed, _) = watch::channel(false);
        Self {
            workflow_id,
            control: Arc::new(ControlPlane::new()),
            exec_cancel: OnceLock::new(),
            confirmed,
            cancel_requested: AtomicBool::new(false),
            prior_status,
            created_at: Utc::now(),
        }
    }

    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }

    pub fn control(&self) -> &Arc<ControlPlane> {
        &self.control
    }

    pub fn prior_status(&self) -> WorkflowStatus {
        self.prior_status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Record the execution context's cancel token. Effective once; later
    /// calls are ignored and reported as `false`.
    pub fn set_exec_cancel(&self, token: CancellationToken) -> bool {
        self.exec_cancel.set(token).is_ok()
    }

    /// The stored exec cancel token, if one was recorded.
    pub fn exec_cancel(&self) -> Option<&CancellationToken> {
        self.exec_cancel.get()
    }

    /// Trip the start-confirmation latch. Idempotent.
    pub fn confirm_started(&self) {
        self.confirmed.send_replace(true);
    }

    /// Wait up to `timeout` for the spawned execution to confirm.
    pub async fn wait_for_confirmation(
        &self,
        timeout: std::time::Duration,
    ) -> Result<(), TrackerError> {
        let mut rx = self.confirmed.subscribe();
        match tokio::time::timeout(timeout, rx.wait_for(|confirmed| *confirmed)).await {
            Ok(Ok(_)) => Ok(()),
            _ => Err(TrackerError::ConfirmTimeout),
        }
    }

    /// Record that cancellation was requested. Returns whether it already was.
    pub fn mark_cancel_requested(&self) -> bool {
        self.cancel_requested.swap(true, Ordering::SeqCst)
    }
}
