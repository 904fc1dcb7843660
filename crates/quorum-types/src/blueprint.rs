//! Per-workflow static configuration.
//!
//! A blueprint is fixed at creation time and describes how the phases are
//! driven: consensus gating, retries, the overall timeout, and whether the
//! run fans out across all configured agents or pins a single one.

use serde::{Deserialize, Serialize};

/// How agent work is dispatched during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Fan out to every enabled agent and reconcile by consensus.
    #[default]
    MultiAgent,
    /// Pin one named agent for the whole run.
    SingleAgent,
}

/// Static per-workflow configuration, immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blueprint {
    /// Minimum agreement score required to accept analyze/plan output.
    #[serde(default = "default_consensus_threshold")]
    pub consensus_threshold: f64,
    /// Maximum retries per agent invocation.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Overall run timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Skip external agent side effects; phases produce placeholder output.
    #[serde(default)]
    pub dry_run: bool,
    /// Run agent commands inside the sandbox wrapper when available.
    #[serde(default)]
    pub sandbox: bool,
    /// Whether the optional refine phase runs before analyze.
    #[serde(default = "default_refine_enabled")]
    pub refine: bool,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    /// Agent name for single-agent mode. Must name a configured, enabled agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// Model override for single-agent mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Reasoning effort hint passed through to the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
}

fn default_consensus_threshold() -> f64 {
    0.75
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    3600
}

fn default_refine_enabled() -> bool {
    true
}

impl Default for Blueprint {
    fn default() -> Self {
        Self {
            consensus_threshold: default_consensus_threshold(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            dry_run: false,
            sandbox: false,
            refine: default_refine_enabled(),
            execution_mode: ExecutionMode::MultiAgent,
            agent: None,
            model: None,
            reasoning_effort: None,
        }
    }
}
