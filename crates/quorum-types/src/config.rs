//! Project configuration loaded from `.quorum/config.yaml`.
//!
//! A missing or malformed file yields the defaults; the loader in the infra
//! crate logs a warning rather than failing the request path.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One configured agent CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent name referenced by single-agent blueprints (e.g. "claude").
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Executable invoked for this agent; defaults to the agent name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl AgentConfig {
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or(&self.name)
    }
}

/// Timing knobs for the execution core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// How often runners are expected to touch the heartbeat.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Heartbeat age after which a handle-less running row is a zombie.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    /// Zombie sweep cadence.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Grace between cooperative cancel and hard context teardown.
    #[serde(default = "default_cancel_grace_secs")]
    pub cancel_grace_secs: u64,
    /// Bound on waiting for the spawned execution to confirm.
    #[serde(default = "default_confirm_timeout_ms")]
    pub confirm_timeout_ms: u64,
    /// Cool-down window for duplicate prompts.
    #[serde(default = "default_duplicate_window_secs")]
    pub duplicate_window_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_stale_after_secs() -> u64 {
    90
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_cancel_grace_secs() -> u64 {
    60
}

fn default_confirm_timeout_ms() -> u64 {
    2000
}

fn default_duplicate_window_secs() -> u64 {
    300
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            stale_after_secs: default_stale_after_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            cancel_grace_secs: default_cancel_grace_secs(),
            confirm_timeout_ms: default_confirm_timeout_ms(),
            duplicate_window_secs: default_duplicate_window_secs(),
        }
    }
}

impl ExecutionConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_secs(self.cancel_grace_secs)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }

    pub fn duplicate_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.duplicate_window_secs as i64)
    }
}

/// Issue pipeline defaults for a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuesConfig {
    /// Target repository, `owner/repo`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    /// Provider name; only "github" publishes today.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

fn default_provider() -> String {
    "github".to_string()
}

impl Default for IssuesConfig {
    fn default() -> Self {
        Self {
            repository: None,
            provider: default_provider(),
            labels: Vec::new(),
        }
    }
}

/// Full per-project configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default = "default_agents")]
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub issues: IssuesConfig,
}

fn default_agents() -> Vec<AgentConfig> {
    vec![AgentConfig {
        name: "claude".to_string(),
        enabled: true,
        command: None,
        model: None,
    }]
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            agents: default_agents(),
            execution: ExecutionConfig::default(),
            issues: IssuesConfig::default(),
        }
    }
}

impl ProjectConfig {
    /// Agents available for multi-agent fan-out.
    pub fn enabled_agents(&self) -> Vec<&AgentConfig> {
        self.agents.iter().filter(|a| a.enabled).collect()
    }

    /// Look up an enabled agent by name (single-agent blueprint validation).
    pub fn enabled_agent(&self, name: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| a.enabled && a.name == name)
    }
}
