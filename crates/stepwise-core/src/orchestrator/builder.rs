//! Builder for creating and configuring Orchestrator instances.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use super::Orchestrator;
use crate::{
    agent::{Agent, AgentRegistry},
    config::EngineConfig,
    context::ContextAssembler,
    dispatch::ExecutionDispatcher,
    error::{EngineError, Result},
    gate::ApprovalGate,
    planning::{PlanBuilder, PlanProposer},
    status::StatusReporter,
    store::{PlanStore, SqlitePlanStore},
};

/// Builder for creating and configuring Orchestrator instances.
#[derive(Default)]
pub struct OrchestratorBuilder {
    database_path: Option<PathBuf>,
    store: Option<Arc<dyn PlanStore>>,
    registry: AgentRegistry,
    proposer: Option<Arc<dyn PlanProposer>>,
    config: EngineConfig,
}

impl OrchestratorBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a custom database file path.
    ///
    /// If not specified, uses XDG Base Directory specification:
    /// `$XDG_DATA_HOME/stepwise/stepwise.db` or
    /// `~/.local/share/stepwise/stepwise.db`
    pub fn with_database_path<P: AsRef<Path>>(mut self, path: Option<P>) -> Self {
        if let Some(path) = path {
            self.database_path = Some(path.as_ref().to_path_buf());
        }
        self
    }

    /// Uses an already constructed store instead of opening SQLite.
    pub fn with_store(mut self, store: Arc<dyn PlanStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_registry(mut self, registry: AgentRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.registry.register(agent);
        self
    }

    pub fn with_proposer(mut self, proposer: Arc<dyn PlanProposer>) -> Self {
        self.proposer = Some(proposer);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the configured orchestrator.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::FileSystem` if the database directory cannot be
    /// created, `EngineError::XdgDirectory` if no default location exists,
    /// and `EngineError::Database` if schema initialization fails.
    pub async fn build(self) -> Result<Orchestrator> {
        let store: Arc<dyn PlanStore> = match self.store {
            Some(store) => store,
            None => {
                let db_path = match self.database_path {
                    Some(path) => path,
                    None => Self::default_database_path()?,
                };
                Arc::new(SqlitePlanStore::open(db_path).await?)
            }
        };

        let config = self.config;
        let assembler = Arc::new(ContextAssembler::new(config.synthesis_agents.iter().cloned()));
        let planner = self
            .proposer
            .map(|proposer| PlanBuilder::new(proposer, self.registry.clone(), &config));

        let gate = ApprovalGate::new(store.clone(), assembler.clone(), config.conflict_retries);
        let dispatcher =
            ExecutionDispatcher::new(store.clone(), self.registry.clone(), assembler, &config);
        let reporter = StatusReporter::new(store.clone(), config.message_window);

        Ok(Orchestrator {
            store,
            registry: self.registry,
            planner,
            gate,
            dispatcher,
            reporter,
            config,
        })
    }

    /// Returns the default database path following XDG Base Directory
    /// specification.
    fn default_database_path() -> Result<PathBuf> {
        xdg::BaseDirectories::with_prefix("stepwise")
            .place_data_file("stepwise.db")
            .map_err(|e| EngineError::XdgDirectory(e.to_string()))
    }
}
