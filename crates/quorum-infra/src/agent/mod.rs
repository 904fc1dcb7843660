//! Subprocess agent adapter and runtime dispatch.

pub mod command;

pub use command::CommandAgentAdapter;

use quorum_core::agent::{AgentAdapter, AgentError, AgentInvocation, AgentOutcome, EchoAdapter};
use tokio_util::sync::CancellationToken;

/// Adapter selected per blueprint: real subprocess invocation, or the echo
/// adapter for dry runs. Keeps the runner type concrete at the API layer.
pub enum AgentDispatch {
    Command(CommandAgentAdapter),
    Echo(EchoAdapter),
}

impl AgentDispatch {
    pub fn for_dry_run(dry_run: bool) -> Self {
        if dry_run {
            Self::Echo(EchoAdapter)
        } else {
            Self::Command(CommandAgentAdapter)
        }
    }
}

impl AgentAdapter for AgentDispatch {
    async fn invoke(
        &self,
        invocation: AgentInvocation,
        cancel: &CancellationToken,
    ) -> Result<AgentOutcome, AgentError> {
        match self {
            Self::Command(adapter) => adapter.invoke(invocation, cancel).await,
            Self::Echo(adapter) => adapter.invoke(invocation, cancel).await,
        }
    }
}
