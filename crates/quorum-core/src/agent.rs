//! Agent adapter seam.
//!
//! The runner drives external AI agent CLIs through this trait. The real
//! subprocess adapter lives in quorum-infra; the echo adapter here backs
//! dry-run blueprints and tests.

use quorum_types::workflow::WorkflowPhase;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// One agent invocation request.
#[derive(Debug, Clone)]
pub struct AgentInvocation {
    /// Agent name from the project config (e.g. "claude").
    pub agent: String,
    /// Executable to run; usually the agent name.
    pub command: String,
    pub model: Option<String>,
    pub reasoning_effort: Option<String>,
    pub phase: WorkflowPhase,
    pub prompt: String,
    pub sandbox: bool,
}

/// What an agent produced.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub content: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

/// Errors from agent invocation.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent '{agent}' failed: {message}")]
    Failed { agent: String, message: String },

    #[error("agent invocation cancelled")]
    Cancelled,
}

/// Adapter over one family of agent CLIs.
pub trait AgentAdapter: Send + Sync {
    /// Run one invocation. Implementations must abort promptly (killing any
    /// child process) when `cancel` fires.
    fn invoke(
        &self,
        invocation: AgentInvocation,
        cancel: &CancellationToken,
    ) -> impl std::future::Future<Output = Result<AgentOutcome, AgentError>> + Send;
}

/// Deterministic adapter used for dry runs and tests: echoes a summary of
/// the invocation back as the agent output.
pub struct EchoAdapter;

impl AgentAdapter for EchoAdapter {
    async fn invoke(
        &self,
        invocation: AgentInvocation,
        cancel: &CancellationToken,
    ) -> Result<AgentOutcome, AgentError> {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        let content = format!(
            "[{}] {} response for phase {}:\n{}",
            invocation.agent,
            if invocation.sandbox { "sandboxed" } else { "direct" },
            invocation.phase,
            invocation.prompt
        );
        let tokens = invocation.prompt.split_whitespace().count() as u64;
        Ok(AgentOutcome {
            tokens_in: tokens,
            tokens_out: content.split_whitespace().count() as u64,
            content,
        })
    }
}
