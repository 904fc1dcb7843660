//! Background zombie sweep loop.
//!
//! Periodically scans the project's workflows for rows persisted as running
//! with no local handle and a stale heartbeat, and transitions them to
//! failed. The per-pass logic lives on the tracker (`sweep_once`); this
//! module only owns the loop and its shutdown.

use std::sync::Arc;

use chrono::Utc;
use quorum_types::config::ExecutionConfig;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::store::WorkflowStore;

use super::tracker::ExecutionTracker;

/// Spawn the sweep loop for one project. Runs until `shutdown` fires.
pub fn spawn_sweeper<S: WorkflowStore + 'static>(
    tracker: Arc<ExecutionTracker<S>>,
    config: ExecutionConfig,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let stale_after = chrono::Duration::seconds(config.stale_after_secs as i64);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.sweep_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so a freshly restarted
        // server gives in-flight confirmations a full interval.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            match tracker.sweep_once(Utc::now(), stale_after).await {
                Ok(0) => {}
                Ok(swept) => {
                    tracing::info!(swept, "zombie sweep transitioned workflows to failed");
                }
                Err(err) => {
                    tracing::warn!(error = %err, "zombie sweep pass failed");
                }
            }
        }
        tracing::debug!("zombie sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use quorum_types::blueprint::Blueprint;
    use quorum_types::workflow::{WorkflowState, WorkflowStatus};

    #[tokio::test(start_paused = true)]
    async fn sweeper_fails_zombie_within_one_interval() {
        let store = Arc::new(MemoryStore::new());
        let mut zombie = WorkflowState::new("p", None, Blueprint::default());
        zombie.status = WorkflowStatus::Running;
        zombie.heartbeat_at = Some(Utc::now() - chrono::Duration::seconds(600));
        let id = zombie.id.clone();
        store.insert(zombie).await;

        let config = ExecutionConfig {
            sweep_interval_secs: 1,
            ..ExecutionConfig::default()
        };
        let tracker = Arc::new(ExecutionTracker::new(Arc::clone(&store), &config));
        let shutdown = CancellationToken::new();
        let task = spawn_sweeper(Arc::clone(&tracker), config, shutdown.clone());

        // Let two virtual intervals elapse.
        tokio::time::sleep(std::time::Duration::from_secs(3)).await;

        let state = store.load(&id).await.unwrap().unwrap();
        assert_eq!(state.status, WorkflowStatus::Failed);
        assert!(state.error.as_deref().unwrap().contains("zombie sweeper"));

        shutdown.cancel();
        task.await.unwrap();
    }
}
