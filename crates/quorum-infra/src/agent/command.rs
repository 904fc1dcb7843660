//! Agent adapter invoking agent CLIs (claude, gemini, codex, ...) as child
//! processes.
//!
//! The prompt goes in on stdin, the response comes back on stdout. The child
//! is spawned with kill-on-drop so cancelling the execution context tears
//! down the process tree promptly.

use std::process::Stdio;

use quorum_core::agent::{AgentAdapter, AgentError, AgentInvocation, AgentOutcome};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Rough whitespace-token estimate used for metrics; agent CLIs that report
/// real usage do so in-band and are not parsed here.
fn estimate_tokens(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

/// Subprocess-backed agent adapter.
#[derive(Clone, Default)]
pub struct CommandAgentAdapter;

impl AgentAdapter for CommandAgentAdapter {
    async fn invoke(
        &self,
        invocation: AgentInvocation,
        cancel: &CancellationToken,
    ) -> Result<AgentOutcome, AgentError> {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let mut command = Command::new(&invocation.command);
        if let Some(model) = &invocation.model {
            command.arg("--model").arg(model);
        }
        if let Some(effort) = &invocation.reasoning_effort {
            command.arg("--reasoning-effort").arg(effort);
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| AgentError::Failed {
            agent: invocation.agent.clone(),
            message: format!("failed to spawn '{}': {e}", invocation.command),
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            let prompt = invocation.prompt.clone();
            // A closed stdin just means the agent exited early; the exit
            // status below tells the real story.
            let _ = stdin.write_all(prompt.as_bytes()).await;
            let _ = stdin.shutdown().await;
        }

        let output = tokio::select! {
            // Dropping the wait future kills the child via kill_on_drop.
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            output = child.wait_with_output() => output.map_err(|e| AgentError::Failed {
                agent: invocation.agent.clone(),
                message: e.to_string(),
            })?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AgentError::Failed {
                agent: invocation.agent.clone(),
                message: format!(
                    "'{}' exited with {}: {}",
                    invocation.command,
                    output.status,
                    stderr.trim()
                ),
            });
        }

        let content = String::from_utf8_lossy(&output.stdout).into_owned();
        Ok(AgentOutcome {
            tokens_in: estimate_tokens(&invocation.prompt),
            tokens_out: estimate_tokens(&content),
            content,
        })
    }
}
