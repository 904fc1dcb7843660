//! Progress notifier: couples event publication with durable agent history.
//!
//! The runner reports progress here; the notifier publishes to the project's
//! event bus immediately and appends agent-event records onto the state the
//! runner owns. Records accumulate unsaved until `flush` (or the runner's
//! next checkpoint save) persists them, so the orchestrator defers a flush on
//! the way out of every execution. The notifier knows nothing about the
//! runner, which breaks the runner/notifier reference cycle.

use std::sync::Arc;

use chrono::Utc;
use quorum_types::error::StoreError;
use quorum_types::event::WorkflowEvent;
use quorum_types::workflow::{AgentEventRecord, WorkflowState};

use crate::event::EventBus;
use crate::store::WorkflowStore;

/// Event + history sink for one execution.
pub struct ProgressNotifier<S> {
    bus: EventBus,
    store: Arc<S>,
}

impl<S: WorkflowStore> ProgressNotifier<S> {
    pub fn new(bus: EventBus, store: Arc<S>) -> Self {
        Self { bus, store }
    }

    /// Publish a progress event to SSE subscribers. Fire-and-forget.
    pub fn publish(&self, event: WorkflowEvent) {
        self.bus.publish(event);
    }

    /// Record one agent interaction on the state and publish nothing; the
    /// record is persisted at the next checkpoint or flush.
    pub fn record_agent_event(
        &self,
        state: &mut WorkflowState,
        agent: &str,
        message: impl Into<String>,
    ) {
        state.agent_events.push(AgentEventRecord {
            timestamp: Utc::now(),
            agent: agent.to_string(),
            phase: state.current_phase,
            message: message.into(),
        });
    }

    /// Persist the state, including any agent events recorded since the last
    /// save.
    pub async fn flush(&self, state: &mut WorkflowState) -> Result<(), StoreError> {
        self.store.save(state).await
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}
