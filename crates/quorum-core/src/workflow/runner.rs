//! The phase runner: drives a workflow through refine, analyze, plan, and
//! execute against the configured agents.
//!
//! At every suspension point (before each task, between phases, after each
//! agent call) the runner waits on the pause gate, checks cancellation,
//! touches the heartbeat, and persists partial state. It never generates a
//! new workflow ID and never calls `finish_execution`; the orchestrator owns
//! both.
//!
//! A runner leaves the state terminal (completed/failed) for full runs, or
//! paused at the next phase for phase-only entry points, so the workflow is
//! resumable by `/plan`, `/execute`, or `/run`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use quorum_types::error::RunnerError;
use quorum_types::workflow::{
    TaskState, TaskStatus, WorkflowPhase, WorkflowState, WorkflowStatus,
};
use quorum_types::event::WorkflowEvent;
use tokio_util::sync::CancellationToken;

use crate::agent::{AgentAdapter, AgentError, AgentInvocation};
use crate::execution::ControlPlane;
use crate::store::WorkflowStore;

use super::notifier::ProgressNotifier;

// ---------------------------------------------------------------------------
// Execution kinds
// ---------------------------------------------------------------------------

/// Which entry point an execution came through. Determines the admission
/// rule and the context deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionKind {
    Run,
    Analyze,
    Plan,
    Replan,
    Execute,
}

impl ExecutionKind {
    /// Per-endpoint execution deadline.
    pub fn deadline(self) -> Duration {
        match self {
            Self::Run | Self::Analyze => Duration::from_secs(4 * 3600),
            Self::Plan | Self::Replan => Duration::from_secs(2 * 3600),
            Self::Execute => Duration::from_secs(8 * 3600),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Analyze => "analyze",
            Self::Plan => "plan",
            Self::Replan => "replan",
            Self::Execute => "execute",
        }
    }
}

// ---------------------------------------------------------------------------
// Execution context and runner contract
// ---------------------------------------------------------------------------

/// What a runner needs from its surroundings: the detached execution
/// cancellation source and the shared control plane. Project-scoped values
/// travel on the runner itself, never on a request context.
#[derive(Clone)]
pub struct ExecContext {
    pub cancel: CancellationToken,
    pub control: Arc<ControlPlane>,
}

/// Contract the orchestrator invokes. One of these methods runs per
/// execution; each operates on the passed-in state and leaves it terminal or
/// resumable.
pub trait WorkflowRunner: Send + Sync {
    fn run_with_state(
        &self,
        ctx: &ExecContext,
        state: &mut WorkflowState,
    ) -> impl std::future::Future<Output = Result<(), RunnerError>> + Send;

    /// Continue a prior run from its current phase, skipping completed
    /// tasks. Also the entry point for `/execute`.
    fn resume_with_state(
        &self,
        ctx: &ExecContext,
        state: &mut WorkflowState,
    ) -> impl std::future::Future<Output = Result<(), RunnerError>> + Send;

    fn analyze_with_state(
        &self,
        ctx: &ExecContext,
        state: &mut WorkflowState,
    ) -> impl std::future::Future<Output = Result<(), RunnerError>> + Send;

    fn plan_with_state(
        &self,
        ctx: &ExecContext,
        state: &mut WorkflowState,
    ) -> impl std::future::Future<Output = Result<(), RunnerError>> + Send;

    fn replan_with_state(
        &self,
        ctx: &ExecContext,
        state: &mut WorkflowState,
        extra_context: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), RunnerError>> + Send;
}

// ---------------------------------------------------------------------------
// PhaseRunner
// ---------------------------------------------------------------------------

/// One resolved agent the runner fans out to.
#[derive(Debug, Clone)]
pub struct AgentSpec {
    pub name: String,
    pub command: String,
    pub model: Option<String>,
}

/// Concrete runner over a store and an agent adapter.
pub struct PhaseRunner<S, A> {
    store: Arc<S>,
    adapter: Arc<A>,
    notifier: ProgressNotifier<S>,
    agents: Vec<AgentSpec>,
    project_root: PathBuf,
}

impl<S: WorkflowStore, A: AgentAdapter> PhaseRunner<S, A> {
    pub fn new(
        store: Arc<S>,
        adapter: Arc<A>,
        notifier: ProgressNotifier<S>,
        agents: Vec<AgentSpec>,
        project_root: PathBuf,
    ) -> Self {
        Self {
            store,
            adapter,
            notifier,
            agents,
            project_root,
        }
    }

    pub fn notifier(&self) -> &ProgressNotifier<S> {
        &self.notifier
    }

    // -----------------------------------------------------------------------
    // Suspension points
    // -----------------------------------------------------------------------

    /// The mandatory checkpoint between units of work: pause gate, cancel
    /// check, external-termination guard, heartbeat, partial-state save.
    async fn suspension_point(
        &self,
        ctx: &ExecContext,
        state: &mut WorkflowState,
    ) -> Result<(), RunnerError> {
        if ctx.control.wait_if_paused(&ctx.cancel).await {
            tracing::debug!(workflow_id = %state.id, "pause gate released");
        }
        self.check_cancelled(ctx, state)?;

        // A sweeper or force-stop may have failed the row underneath us;
        // a stale runner must not resurrect it.
        if let Some(fresh) = self.store.load(&state.id).await? {
            if fresh.status == WorkflowStatus::Failed
                && state.status == WorkflowStatus::Running
            {
                return Err(RunnerError::Terminated);
            }
        }

        self.store.touch_heartbeat(&state.id).await?;
        state.heartbeat_at = Some(Utc::now());
        self.store.save(state).await?;
        Ok(())
    }

    fn check_cancelled(
        &self,
        ctx: &ExecContext,
        state: &WorkflowState,
    ) -> Result<(), RunnerError> {
        if ctx.control.is_cancelled() || ctx.cancel.is_cancelled() {
            Err(RunnerError::Cancelled {
                phase: state.current_phase.to_string(),
            })
        } else {
            Ok(())
        }
    }

    // -----------------------------------------------------------------------
    // Agent fan-out
    // -----------------------------------------------------------------------

    /// Invoke every resolved agent with the same prompt, retrying transient
    /// failures per the blueprint. Cancellation is checked after every call.
    async fn invoke_agents(
        &self,
        ctx: &ExecContext,
        state: &mut WorkflowState,
        prompt: &str,
    ) -> Result<Vec<(String, String)>, RunnerError> {
        let mut outputs = Vec::with_capacity(self.agents.len());
        for spec in &self.agents {
            let outcome = self.invoke_one(ctx, state, spec, prompt).await?;
            state.metrics.tokens_in += outcome.tokens_in;
            state.metrics.tokens_out += outcome.tokens_out;
            self.notifier.record_agent_event(
                state,
                &spec.name,
                format!(
                    "phase {}: {} tokens out",
                    state.current_phase, outcome.tokens_out
                ),
            );
            self.check_cancelled(ctx, state)?;
            outputs.push((spec.name.clone(), outcome.content));
        }
        Ok(outputs)
    }

    async fn invoke_one(
        &self,
        ctx: &ExecContext,
        state: &WorkflowState,
        spec: &AgentSpec,
        prompt: &str,
    ) -> Result<crate::agent::AgentOutcome, RunnerError> {
        let mut last_error = String::new();
        for attempt in 1..=state.blueprint.max_retries.max(1) {
            let invocation = AgentInvocation {
                agent: spec.name.clone(),
                command: spec.command.clone(),
                model: spec
                    .model
                    .clone()
                    .or_else(|| state.blueprint.model.clone()),
                reasoning_effort: state.blueprint.reasoning_effort.clone(),
                phase: state.current_phase,
                prompt: prompt.to_string(),
                sandbox: state.blueprint.sandbox,
            };
            match self.adapter.invoke(invocation, &ctx.cancel).await {
                Ok(outcome) => return Ok(outcome),
                Err(AgentError::Cancelled) => {
                    return Err(RunnerError::Cancelled {
                        phase: state.current_phase.to_string(),
                    });
                }
                Err(AgentError::Failed { message, .. }) => {
                    tracing::warn!(
                        workflow_id = %state.id,
                        agent = spec.name.as_str(),
                        attempt,
                        error = message.as_str(),
                        "agent invocation failed"
                    );
                    last_error = message;
                }
            }
        }
        Err(RunnerError::Agent {
            agent: spec.name.clone(),
            message: last_error,
        })
    }

    // -----------------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------------

    async fn run_refine(
        &self,
        ctx: &ExecContext,
        state: &mut WorkflowState,
    ) -> Result<(), RunnerError> {
        self.notifier.publish(WorkflowEvent::PhaseStarted {
            workflow_id: state.id.clone(),
            phase: WorkflowPhase::Refine,
        });
        let prompt = format!(
            "Refine the following request into a precise working brief. \
             Keep the original intent, resolve ambiguity.\n\n{}",
            state.prompt
        );
        let outputs = self.invoke_agents(ctx, state, &prompt).await?;
        self.write_artifact(state, "refine/brief.md", &join_outputs(&outputs))
            .await?;
        state.add_checkpoint(WorkflowPhase::Refine, "refined brief written");
        self.notifier.publish(WorkflowEvent::PhaseCompleted {
            workflow_id: state.id.clone(),
            phase: WorkflowPhase::Refine,
        });
        Ok(())
    }

    async fn run_analyze(
        &self,
        ctx: &ExecContext,
        state: &mut WorkflowState,
    ) -> Result<(), RunnerError> {
        self.notifier.publish(WorkflowEvent::PhaseStarted {
            workflow_id: state.id.clone(),
            phase: WorkflowPhase::Analyze,
        });
        let prompt = format!(
            "Analyze the repository and the following request. Identify the \
             affected areas, risks, and the shape of a solution.\n\n{}",
            state.prompt
        );
        let outputs = self.invoke_agents(ctx, state, &prompt).await?;

        let score = consensus_score(&outputs);
        state.metrics.consensus_score = score;
        if score < state.blueprint.consensus_threshold {
            return Err(RunnerError::ConsensusBelowThreshold {
                score,
                threshold: state.blueprint.consensus_threshold,
            });
        }

        let mut report = format!("# Consensus analysis\n\nscore: {score:.2}\n\n");
        report.push_str(&join_outputs(&outputs));
        self.write_artifact(state, "analysis/consensus.md", &report)
            .await?;
        state.add_checkpoint(WorkflowPhase::Analyze, "consensus analysis written");
        self.notifier.publish(WorkflowEvent::PhaseCompleted {
            workflow_id: state.id.clone(),
            phase: WorkflowPhase::Analyze,
        });
        Ok(())
    }

    async fn run_plan(
        &self,
        ctx: &ExecContext,
        state: &mut WorkflowState,
        extra_context: Option<&str>,
    ) -> Result<(), RunnerError> {
        self.notifier.publish(WorkflowEvent::PhaseStarted {
            workflow_id: state.id.clone(),
            phase: WorkflowPhase::Plan,
        });
        let mut prompt = format!(
            "Produce an ordered task plan for the following request. One task \
             per line, formatted as `- title: description`.\n\n{}",
            state.prompt
        );
        if let Some(extra) = extra_context {
            prompt.push_str("\n\nAdditional context:\n");
            prompt.push_str(extra);
        }
        let outputs = self.invoke_agents(ctx, state, &prompt).await?;

        // The first agent's plan is canonical; the rest are recorded in the
        // artifact for review.
        let plan_text = outputs
            .first()
            .map(|(_, content)| content.clone())
            .unwrap_or_default();
        self.write_artifact(state, "plan/final.md", &join_outputs(&outputs))
            .await?;

        for (index, (title, description)) in parse_tasks(&plan_text).into_iter().enumerate() {
            let task = TaskState::new(format!("t-{}", index + 1), title, description);
            self.write_artifact(
                state,
                &format!("tasks/{}.md", task.id),
                &format!("# {}\n\n{}\n", task.title, task.description),
            )
            .await?;
            state.push_task(task);
        }
        state.add_checkpoint(
            WorkflowPhase::Plan,
            format!("plan generated with {} tasks", state.task_order.len()),
        );
        self.notifier.publish(WorkflowEvent::PhaseCompleted {
            workflow_id: state.id.clone(),
            phase: WorkflowPhase::Plan,
        });
        Ok(())
    }

    async fn run_execute(
        &self,
        ctx: &ExecContext,
        state: &mut WorkflowState,
    ) -> Result<(), RunnerError> {
        self.notifier.publish(WorkflowEvent::PhaseStarted {
            workflow_id: state.id.clone(),
            phase: WorkflowPhase::Execute,
        });
        let order = state.task_order.clone();
        for task_id in order {
            self.suspension_point(ctx, state).await?;

            let Some(task) = state.tasks.get(&task_id) else {
                continue;
            };
            if task.status == TaskStatus::Completed {
                // Crash/resume path: already done in a prior execution.
                continue;
            }

            let title = task.title.clone();
            let description = task.description.clone();
            self.set_task_status(state, &task_id, TaskStatus::Running, None);
            self.store.save(state).await?;

            let prompt = format!(
                "Execute this task from the agreed plan.\n\nTask: {title}\n{description}\n\n\
                 Original request:\n{}",
                state.prompt
            );
            match self.invoke_agents(ctx, state, &prompt).await {
                Ok(outputs) => {
                    self.write_artifact(
                        state,
                        &format!("tasks/{task_id}-result.md"),
                        &join_outputs(&outputs),
                    )
                    .await?;
                    self.set_task_status(state, &task_id, TaskStatus::Completed, None);
                    self.store.save(state).await?;
                }
                Err(err) => {
                    self.set_task_status(
                        state,
                        &task_id,
                        TaskStatus::Failed,
                        Some(err.to_string()),
                    );
                    let _ = self.store.save(state).await;
                    return Err(err);
                }
            }
        }
        state.add_checkpoint(WorkflowPhase::Execute, "all tasks completed");
        self.notifier.publish(WorkflowEvent::PhaseCompleted {
            workflow_id: state.id.clone(),
            phase: WorkflowPhase::Execute,
        });
        Ok(())
    }

    fn set_task_status(
        &self,
        state: &mut WorkflowState,
        task_id: &str,
        status: TaskStatus,
        error: Option<String>,
    ) {
        if let Some(task) = state.tasks.get_mut(task_id) {
            task.status = status;
            match status {
                TaskStatus::Running => task.started_at = Some(Utc::now()),
                TaskStatus::Completed | TaskStatus::Failed => {
                    task.completed_at = Some(Utc::now())
                }
                TaskStatus::Pending => {}
            }
            task.error = error.clone();
        }
        self.notifier.publish(WorkflowEvent::TaskUpdate {
            workflow_id: state.id.clone(),
            task_id: task_id.to_string(),
            status,
            message: error,
        });
    }

    // -----------------------------------------------------------------------
    // Pipeline driving
    // -----------------------------------------------------------------------

    /// Drive phases from `state.current_phase` to the end of execute.
    async fn drive(
        &self,
        ctx: &ExecContext,
        state: &mut WorkflowState,
    ) -> Result<(), RunnerError> {
        loop {
            self.suspension_point(ctx, state).await?;
            match state.current_phase {
                WorkflowPhase::Refine => {
                    if state.blueprint.refine {
                        self.run_refine(ctx, state).await?;
                    }
                    self.advance(state, WorkflowPhase::Analyze).await?;
                }
                WorkflowPhase::Analyze => {
                    self.run_analyze(ctx, state).await?;
                    self.advance(state, WorkflowPhase::Plan).await?;
                }
                WorkflowPhase::Plan => {
                    self.run_plan(ctx, state, None).await?;
                    self.advance(state, WorkflowPhase::Execute).await?;
                }
                WorkflowPhase::Execute => {
                    self.run_execute(ctx, state).await?;
                    return Ok(());
                }
            }
        }
    }

    async fn advance(
        &self,
        state: &mut WorkflowState,
        phase: WorkflowPhase,
    ) -> Result<(), RunnerError> {
        state.current_phase = phase;
        self.store.save(state).await?;
        Ok(())
    }

    /// Leave a phase-only execution resumable: paused at the current phase.
    async fn park(&self, state: &mut WorkflowState) -> Result<(), RunnerError> {
        state.status = WorkflowStatus::Paused;
        self.store.save(state).await?;
        Ok(())
    }

    async fn complete(&self, state: &mut WorkflowState) -> Result<(), RunnerError> {
        state.status = WorkflowStatus::Completed;
        state.completed_at = Some(Utc::now());
        self.store.save(state).await?;
        tracing::info!(workflow_id = %state.id, "workflow completed");
        Ok(())
    }

    /// Persist a failure outcome. Externally-terminated runs are left alone.
    async fn settle(
        &self,
        state: &mut WorkflowState,
        result: Result<(), RunnerError>,
    ) -> Result<(), RunnerError> {
        match result {
            Ok(()) => Ok(()),
            Err(RunnerError::Terminated) => {
                tracing::warn!(workflow_id = %state.id, "run aborted: row terminated externally");
                Err(RunnerError::Terminated)
            }
            Err(err) => {
                let message = err.to_string();
                state.status = WorkflowStatus::Failed;
                state.error = Some(message.clone());
                state.last_error = Some(message);
                state.completed_at = Some(Utc::now());
                if let Err(save_err) = self.store.save(state).await {
                    tracing::error!(
                        workflow_id = %state.id,
                        error = %save_err,
                        "failed to persist failure outcome"
                    );
                }
                Err(err)
            }
        }
    }

    async fn write_artifact(
        &self,
        state: &WorkflowState,
        rel: &str,
        content: &str,
    ) -> Result<(), RunnerError> {
        let path = self.project_root.join(&state.report_path).join(rel);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RunnerError::Artifact(e.to_string()))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| RunnerError::Artifact(e.to_string()))
    }
}

impl<S: WorkflowStore, A: AgentAdapter> WorkflowRunner for PhaseRunner<S, A> {
    async fn run_with_state(
        &self,
        ctx: &ExecContext,
        state: &mut WorkflowState,
    ) -> Result<(), RunnerError> {
        let result = async {
            self.drive(ctx, state).await?;
            self.complete(state).await
        }
        .await;
        self.settle(state, result).await
    }

    async fn resume_with_state(
        &self,
        ctx: &ExecContext,
        state: &mut WorkflowState,
    ) -> Result<(), RunnerError> {
        state.resume_count += 1;
        if state.resume_count > state.max_resumes {
            let result = Err(RunnerError::ResumeLimitExceeded {
                max: state.max_resumes,
            });
            return self.settle(state, result).await;
        }
        let result = async {
            self.drive(ctx, state).await?;
            self.complete(state).await
        }
        .await;
        self.settle(state, result).await
    }

    async fn analyze_with_state(
        &self,
        ctx: &ExecContext,
        state: &mut WorkflowState,
    ) -> Result<(), RunnerError> {
        let result = async {
            self.suspension_point(ctx, state).await?;
            // Analyze-only entry never runs refine, even when enabled.
            state.current_phase = WorkflowPhase::Analyze;
            self.run_analyze(ctx, state).await?;
            state.current_phase = WorkflowPhase::Plan;
            self.park(state).await
        }
        .await;
        self.settle(state, result).await
    }

    async fn plan_with_state(
        &self,
        ctx: &ExecContext,
        state: &mut WorkflowState,
    ) -> Result<(), RunnerError> {
        let result = async {
            self.suspension_point(ctx, state).await?;
            self.run_plan(ctx, state, None).await?;
            state.current_phase = WorkflowPhase::Execute;
            self.park(state).await
        }
        .await;
        self.settle(state, result).await
    }

    async fn replan_with_state(
        &self,
        ctx: &ExecContext,
        state: &mut WorkflowState,
        extra_context: Option<&str>,
    ) -> Result<(), RunnerError> {
        let result = async {
            self.suspension_point(ctx, state).await?;
            state.clear_plan();
            state.current_phase = WorkflowPhase::Plan;
            self.run_plan(ctx, state, extra_context).await?;
            state.current_phase = WorkflowPhase::Execute;
            self.park(state).await
        }
        .await;
        self.settle(state, result).await
    }
}

// ---------------------------------------------------------------------------
// Plan parsing and consensus
// ---------------------------------------------------------------------------

/// Parse `- title: description` task lines out of a plan. Numbered lists are
/// accepted too. When nothing matches, the whole plan becomes one task so
/// execute always has work.
fn parse_tasks(plan: &str) -> Vec<(String, String)> {
    let mut tasks = Vec::new();
    for line in plan.lines() {
        let trimmed = line.trim();
        let body = if let Some(rest) = trimmed.strip_prefix("- ") {
            rest.trim_start_matches("[ ] ")
        } else if let Some(rest) = strip_numbered_prefix(trimmed) {
            rest
        } else {
            continue;
        };
        if body.is_empty() {
            continue;
        }
        let (title, description) = match body.split_once(':') {
            Some((t, d)) => (t.trim().to_string(), d.trim().to_string()),
            None => (body.trim().to_string(), String::new()),
        };
        tasks.push((title, description));
    }
    if tasks.is_empty() {
        tasks.push((
            "Execute plan".to_string(),
            plan.trim().to_string(),
        ));
    }
    tasks
}

fn strip_numbered_prefix(line: &str) -> Option<&str> {
    let digits = line.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    line[digits..].strip_prefix(". ")
}

/// Mean pairwise word-set overlap across agent outputs. A single output (or
/// none) is full agreement.
fn consensus_score(outputs: &[(String, String)]) -> f64 {
    if outputs.len() <= 1 {
        return 1.0;
    }
    let sets: Vec<std::collections::HashSet<String>> = outputs
        .iter()
        .map(|(_, content)| {
            content
                .split_whitespace()
                .map(|w| w.to_lowercase())
                .collect()
        })
        .collect();
    let mut total = 0.0;
    let mut pairs = 0u32;
    for i in 0..sets.len() {
        for j in (i + 1)..sets.len() {
            let intersection = sets[i].intersection(&sets[j]).count() as f64;
            let union = sets[i].union(&sets[j]).count() as f64;
            total += if union == 0.0 { 1.0 } else { intersection / union };
            pairs += 1;
        }
    }
    total / pairs as f64
}

fn join_outputs(outputs: &[(String, String)]) -> String {
    outputs
        .iter()
        .map(|(agent, content)| format!("## {agent}\n\n{content}\n"))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
