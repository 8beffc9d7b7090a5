//! Name → agent registry, injected into the plan builder and dispatcher.

use std::{collections::BTreeMap, sync::Arc};

use log::warn;
use serde::{Deserialize, Serialize};

use super::Agent;
use crate::error::{EngineError, Result};

/// Catalog entry shown to the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub name: String,
    pub capabilities: Vec<String>,
}

/// Registered agents keyed by name.
#[derive(Default, Clone)]
pub struct AgentRegistry {
    agents: BTreeMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an agent under its own name, replacing any previous entry.
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        let name = agent.name().to_string();
        if self.agents.insert(name.clone(), agent).is_some() {
            warn!("Agent '{name}' registered twice; keeping the latest");
        }
    }

    /// Chainable form of [`register`](Self::register).
    pub fn with(mut self, agent: Arc<dyn Agent>) -> Self {
        self.register(agent);
        self
    }

    /// Resolves an agent by name.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::UnknownAgent` when nothing is registered under
    /// `name`.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Agent>> {
        self.agents
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownAgent {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    /// First agent (by name) advertising `capability`, compared
    /// case-insensitively.
    pub fn find_by_capability(&self, capability: &str) -> Option<&str> {
        self.agents
            .iter()
            .find(|(_, agent)| {
                agent
                    .capabilities()
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(capability))
            })
            .map(|(name, _)| name.as_str())
    }

    /// Catalog of every registered agent, sorted by name.
    pub fn catalog(&self) -> Vec<AgentDescriptor> {
        self.agents
            .iter()
            .map(|(name, agent)| AgentDescriptor {
                name: name.clone(),
                capabilities: agent.capabilities(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::agent::{AgentError, AgentReply};

    struct Named(&'static str, &'static [&'static str]);

    #[async_trait]
    impl Agent for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn capabilities(&self) -> Vec<String> {
            self.1.iter().map(|c| c.to_string()).collect()
        }

        async fn run(&self, _task: &str, _context: &Value) -> std::result::Result<AgentReply, AgentError> {
            Ok(AgentReply::text(self.0))
        }
    }

    fn registry() -> AgentRegistry {
        AgentRegistry::new()
            .with(Arc::new(Named("summarizer", &["summarize", "report"])))
            .with(Arc::new(Named("company", &["company-profile"])))
    }

    #[test]
    fn test_resolve_known_and_unknown() {
        let registry = registry();
        assert_eq!(registry.resolve("company").unwrap().name(), "company");
        assert!(matches!(
            registry.resolve("weather"),
            Err(EngineError::UnknownAgent { name }) if name == "weather"
        ));
    }

    #[test]
    fn test_catalog_sorted_by_name() {
        let catalog = registry().catalog();
        let names: Vec<_> = catalog.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["company", "summarizer"]);
        assert_eq!(catalog[1].capabilities, vec!["summarize", "report"]);
    }

    #[test]
    fn test_find_by_capability_ignores_case() {
        let registry = registry();
        assert_eq!(registry.find_by_capability("REPORT"), Some("summarizer"));
        assert_eq!(registry.find_by_capability("forecast"), None);
    }

    #[test]
    fn test_register_replaces_duplicate() {
        let mut registry = registry();
        registry.register(Arc::new(Named("company", &["filings"])));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.find_by_capability("filings"), Some("company"));
    }
}
