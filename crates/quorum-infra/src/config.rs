//! Per-project configuration loader.
//!
//! Reads `.quorum/config.yaml` from the project root. A missing file yields
//! the defaults silently; a malformed file logs a warning and yields the
//! defaults, so a broken config never takes the request path down.

use std::path::{Path, PathBuf};

use quorum_types::config::ProjectConfig;

/// Loader bound to one project root.
#[derive(Clone)]
pub struct ConfigLoader {
    config_path: PathBuf,
}

impl ConfigLoader {
    pub fn new(project_root: &Path) -> Self {
        Self {
            config_path: project_root.join(".quorum").join("config.yaml"),
        }
    }

    /// Load the project config, falling back to defaults.
    pub async fn load(&self) -> ProjectConfig {
        let content = match tokio::fs::read_to_string(&self.config_path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    path = %self.config_path.display(),
                    "no config.yaml, using defaults"
                );
                return ProjectConfig::default();
            }
            Err(err) => {
                tracing::warn!(
                    path = %self.config_path.display(),
                    error = %err,
                    "failed to read config.yaml, using defaults"
                );
                return ProjectConfig::default();
            }
        };

        match serde_yaml_ng::from_str::<ProjectConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(
                    path = %self.config_path.display(),
                    error = %err,
                    "failed to parse config.yaml, using defaults"
                );
                ProjectConfig::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigLoader::new(dir.path()).load().await;
        assert_eq!(config.enabled_agents().len(), 1);
        assert_eq!(config.execution.sweep_interval_secs, 30);
    }

    #[tokio::test]
    async fn valid_yaml_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let quorum = dir.path().join(".quorum");
        tokio::fs::create_dir_all(&quorum).await.unwrap();
        tokio::fs::write(
            quorum.join("config.yaml"),
            "agents:\n  - name: claude\n  - name: gemini\nexecution:\n  cancel_grace_secs: 15\n",
        )
        .await
        .unwrap();

        let config = ConfigLoader::new(dir.path()).load().await;
        assert_eq!(config.agents.len(), 2);
        assert_eq!(config.execution.cancel_grace_secs, 15);
    }

    #[tokio::test]
    async fn malformed_yaml_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let quorum = dir.path().join(".quorum");
        tokio::fs::create_dir_all(&quorum).await.unwrap();
        tokio::fs::write(quorum.join("config.yaml"), "agents: [not: {valid")
            .await
            .unwrap();

        let config = ConfigLoader::new(dir.path()).load().await;
        assert_eq!(config.enabled_agents().len(), 1);
    }
}
