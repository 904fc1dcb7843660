//! Application state: the project registry and per-project resource pool.
//!
//! Each project owns a bundle of scoped services: SQLite store, event bus,
//! config loader, execution tracker (with its zombie sweeper), and draft
//! store. Bundles are acquired lazily on first use and cached in a DashMap;
//! the server's default project doubles as the global fallback when a
//! request names no project. Core components are generic over the store and
//! adapter traits; this module pins them to the concrete infra types.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use quorum_core::event::EventBus;
use quorum_core::execution::sweeper::spawn_sweeper;
use quorum_core::execution::ExecutionTracker;
use quorum_core::workflow::notifier::ProgressNotifier;
use quorum_core::workflow::runner::{AgentSpec, PhaseRunner};
use quorum_infra::agent::AgentDispatch;
use quorum_infra::config::ConfigLoader;
use quorum_infra::issues::DraftStore;
use quorum_infra::project::ProjectLayout;
use quorum_infra::sqlite::{DatabasePool, SqliteWorkflowStore};
use quorum_types::blueprint::{Blueprint, ExecutionMode};
use quorum_types::config::ProjectConfig;

use crate::http::error::{ApiError, FieldError};

/// Concrete type aliases pinning the core generics to infra implementations.
pub type ConcreteStore = SqliteWorkflowStore;
pub type ConcreteTracker = ExecutionTracker<ConcreteStore>;
pub type ConcreteRunner = PhaseRunner<ConcreteStore, AgentDispatch>;

/// Everything scoped to one project.
pub struct ProjectResources {
    pub id: String,
    pub layout: ProjectLayout,
    pub store: Arc<ConcreteStore>,
    pub bus: EventBus,
    pub config_loader: ConfigLoader,
    pub tracker: Arc<ConcreteTracker>,
    pub drafts: DraftStore,
}

impl ProjectResources {
    /// Resolve the agent list for a blueprint and build a runner + notifier.
    ///
    /// Fails with 409 when single-agent mode names an unconfigured or
    /// disabled agent, and 503 when no agents are configured at all.
    pub async fn runner_for(&self, blueprint: &Blueprint) -> Result<ConcreteRunner, ApiError> {
        let config = self.config_loader.load().await;
        let agents = resolve_agents(&config, blueprint)?;
        let adapter = AgentDispatch::for_dry_run(blueprint.dry_run);
        let notifier = ProgressNotifier::new(self.bus.clone(), Arc::clone(&self.store));
        Ok(PhaseRunner::new(
            Arc::clone(&self.store),
            Arc::new(adapter),
            notifier,
            agents,
            self.layout.root().to_path_buf(),
        ))
    }

    /// Load the project configuration (defaults on missing/malformed).
    pub async fn config(&self) -> ProjectConfig {
        self.config_loader.load().await
    }
}

/// Resolve the blueprint's agent set against the project config.
pub fn resolve_agents(
    config: &ProjectConfig,
    blueprint: &Blueprint,
) -> Result<Vec<AgentSpec>, ApiError> {
    match blueprint.execution_mode {
        ExecutionMode::SingleAgent => {
            let name = blueprint.agent.as_deref().ok_or_else(|| {
                ApiError::validation(
                    "invalid blueprint",
                    vec![FieldError::new(
                        "blueprint.agent",
                        "single-agent mode requires an agent name",
                        "REQUIRED",
                    )],
                )
            })?;
            let agent = config.enabled_agent(name).ok_or_else(|| {
                ApiError::validation(
                    "invalid blueprint",
                    vec![FieldError::new(
                        "blueprint.agent",
                        format!("agent '{name}' is not configured or not enabled"),
                        "UNKNOWN_AGENT",
                    )],
                )
            })?;
            Ok(vec![AgentSpec {
                name: agent.name.clone(),
                command: agent.command().to_string(),
                model: agent.model.clone(),
            }])
        }
        ExecutionMode::MultiAgent => {
            let enabled = config.enabled_agents();
            if enabled.is_empty() {
                return Err(ApiError::Unavailable(
                    "no enabled agents configured for this project".to_string(),
                ));
            }
            Ok(enabled
                .into_iter()
                .map(|a| AgentSpec {
                    name: a.name.clone(),
                    command: a.command().to_string(),
                    model: a.model.clone(),
                })
                .collect())
        }
    }
}

/// Shared application state: registry of project roots plus the pool of
/// acquired resource bundles.
#[derive(Clone)]
pub struct AppState {
    registry: Arc<HashMap<String, PathBuf>>,
    pool: Arc<DashMap<String, Arc<ProjectResources>>>,
    default_project: String,
    shutdown: CancellationToken,
}

impl AppState {
    /// Build the state from `(project id, root)` pairs. The first entry is
    /// the default project.
    pub fn new(projects: Vec<(String, PathBuf)>) -> anyhow::Result<Self> {
        anyhow::ensure!(!projects.is_empty(), "at least one project is required");
        let default_project = projects[0].0.clone();
        let registry: HashMap<String, PathBuf> = projects.into_iter().collect();
        Ok(Self {
            registry: Arc::new(registry),
            pool: Arc::new(DashMap::new()),
            default_project,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn default_project(&self) -> &str {
        &self.default_project
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Registered project IDs.
    pub fn project_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.registry.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Resolve (acquiring lazily) the resource bundle for a project.
    ///
    /// Unknown project IDs are 404; a database that cannot be opened is 503,
    /// the "state management unavailable" case.
    pub async fn resources(&self, project_id: &str) -> Result<Arc<ProjectResources>, ApiError> {
        if let Some(found) = self.pool.get(project_id) {
            return Ok(Arc::clone(found.value()));
        }

        let root = self
            .registry
            .get(project_id)
            .ok_or_else(|| ApiError::NotFound(format!("project '{project_id}' not found")))?;

        let resources = self.acquire(project_id, root.clone()).await?;
        // A concurrent acquire may have won; keep the first inserted bundle
        // so there is exactly one tracker per project.
        let entry = self
            .pool
            .entry(project_id.to_string())
            .or_insert_with(|| Arc::clone(&resources));
        Ok(Arc::clone(entry.value()))
    }

    async fn acquire(
        &self,
        project_id: &str,
        root: PathBuf,
    ) -> Result<Arc<ProjectResources>, ApiError> {
        let layout = ProjectLayout::new(root);
        layout.ensure_layout().await.map_err(|err| {
            ApiError::Unavailable(format!("cannot prepare project directory: {err}"))
        })?;

        let pool = DatabasePool::open(&layout.db_path()).await.map_err(|err| {
            tracing::error!(project = project_id, error = %err, "failed to open project database");
            ApiError::Unavailable("state management unavailable".to_string())
        })?;
        let store = Arc::new(SqliteWorkflowStore::new(pool));

        let config_loader = ConfigLoader::new(layout.root());
        let config = config_loader.load().await;
        let tracker = Arc::new(ExecutionTracker::new(Arc::clone(&store), &config.execution));
        spawn_sweeper(
            Arc::clone(&tracker),
            config.execution.clone(),
            self.shutdown.clone(),
        );

        tracing::info!(project = project_id, root = %layout.root().display(), "project resources acquired");
        Ok(Arc::new(ProjectResources {
            id: project_id.to_string(),
            drafts: DraftStore::new(layout.clone()),
            layout,
            store,
            bus: EventBus::default(),
            config_loader,
            tracker,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_types::config::AgentConfig;

    #[tokio::test]
    async fn resources_are_acquired_once_and_cached() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(vec![("demo".to_string(), dir.path().to_path_buf())]).unwrap();

        let first = state.resources("demo").await.unwrap();
        let second = state.resources("demo").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(dir.path().join(".quorum/runs").exists());
    }

    #[tokio::test]
    async fn unknown_project_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(vec![("demo".to_string(), dir.path().to_path_buf())]).unwrap();
        assert!(matches!(
            state.resources("nope").await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn single_agent_blueprint_requires_enabled_agent() {
        let config = ProjectConfig {
            agents: vec![AgentConfig {
                name: "claude".to_string(),
                enabled: true,
                command: None,
                model: None,
            }],
            ..ProjectConfig::default()
        };

        let valid = Blueprint {
            execution_mode: ExecutionMode::SingleAgent,
            agent: Some("claude".to_string()),
            ..Blueprint::default()
        };
        assert_eq!(resolve_agents(&config, &valid).unwrap().len(), 1);

        let unknown = Blueprint {
            execution_mode: ExecutionMode::SingleAgent,
            agent: Some("gemini".to_string()),
            ..Blueprint::default()
        };
        assert!(matches!(
            resolve_agents(&config, &unknown),
            Err(ApiError::Validation { .. })
        ));

        let unnamed = Blueprint {
            execution_mode: ExecutionMode::SingleAgent,
            ..Blueprint::default()
        };
        assert!(resolve_agents(&config, &unnamed).is_err());
    }

    #[test]
    fn multi_agent_uses_all_enabled() {
        let config = ProjectConfig {
            agents: vec![
                AgentConfig {
                    name: "claude".to_string(),
                    enabled: true,
                    command: None,
                    model: None,
                },
                AgentConfig {
                    name: "gemini".to_string(),
                    enabled: false,
                    command: None,
                    model: None,
                },
            ],
            ..ProjectConfig::default()
        };
        let agents = resolve_agents(&config, &Blueprint::default()).unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].name, "claude");
    }
}
