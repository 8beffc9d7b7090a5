//! Per-step context assembly.
//!
//! Agents are split into two classes:
//!
//! - **Worker** agents receive `dependency_artifacts`: the results of exactly
//!   the steps listed in `step.dependencies`, keyed by step id.
//! - **Synthesis** agents (a fixed, configured set such as `summarizer`)
//!   receive `session_context`: every COMPLETED step with a lower order than
//!   the current one, whatever the declared dependencies say. When there is
//!   no such step they fall back to `dependency_artifacts`.
//!
//! The two payloads travel under distinct keys and a worker never sees
//! `session_context`.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::{
    error::{EngineError, Result},
    graph::DependencyGraph,
    models::{Plan, Step, StepStatus},
};

pub const DEPENDENCY_ARTIFACTS_KEY: &str = "dependency_artifacts";
pub const SESSION_CONTEXT_KEY: &str = "session_context";

/// Context policy an agent is subject to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentClass {
    Worker,
    Synthesis,
}

/// One completed upstream step as seen by a synthesis agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionEntry {
    pub order: u32,
    pub agent_name: String,
    pub action: String,
    pub result: Value,
}

/// The payload a step receives, before it is rendered to JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum StepContext {
    DependencyArtifacts(BTreeMap<u64, Value>),
    Session(Vec<SessionEntry>),
}

impl StepContext {
    /// Renders the context handed to the agent: the objective and file
    /// references plus the payload under its policy-specific key.
    pub fn to_value(&self, plan: &Plan) -> Value {
        let mut object = Map::new();
        object.insert("plan_id".into(), json!(plan.id));
        object.insert("objective".into(), json!(plan.objective));
        object.insert("file_refs".into(), json!(plan.file_refs));
        match self {
            StepContext::DependencyArtifacts(artifacts) => {
                let artifacts: Map<String, Value> = artifacts
                    .iter()
                    .map(|(id, result)| (id.to_string(), result.clone()))
                    .collect();
                object.insert(DEPENDENCY_ARTIFACTS_KEY.into(), Value::Object(artifacts));
            }
            StepContext::Session(entries) => {
                object.insert(SESSION_CONTEXT_KEY.into(), json!(entries));
            }
        }
        Value::Object(object)
    }
}

/// Builds step contexts under the worker/synthesis policy.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    synthesis_agents: BTreeSet<String>,
}

impl ContextAssembler {
    pub fn new<I, S>(synthesis_agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            synthesis_agents: synthesis_agents.into_iter().map(Into::into).collect(),
        }
    }

    pub fn classify(&self, agent_name: &str) -> AgentClass {
        if self.synthesis_agents.contains(agent_name) {
            AgentClass::Synthesis
        } else {
            AgentClass::Worker
        }
    }

    pub fn is_synthesis(&self, agent_name: &str) -> bool {
        self.classify(agent_name) == AgentClass::Synthesis
    }

    /// Assembles the context for `step` from the plan's current steps.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::CorruptState` if a declared dependency is not a
    /// step of the plan.
    pub fn assemble(&self, step: &Step, steps: &[Step]) -> Result<StepContext> {
        let graph = DependencyGraph::new(steps);
        if self.classify(&step.agent_name) == AgentClass::Synthesis {
            let entries = Self::session_entries(step, &graph);
            if !entries.is_empty() {
                return Ok(StepContext::Session(entries));
            }
        }
        Self::dependency_artifacts(step, &graph).map(StepContext::DependencyArtifacts)
    }

    fn dependency_artifacts(step: &Step, graph: &DependencyGraph<'_>) -> Result<BTreeMap<u64, Value>> {
        step.dependencies
            .iter()
            .map(|dep| {
                let parent = graph.get(*dep).ok_or_else(|| {
                    EngineError::corrupt(format!(
                        "step {} depends on step {dep}, which is not part of the plan",
                        step.id
                    ))
                })?;
                Ok((*dep, parent.result.clone().unwrap_or(Value::Null)))
            })
            .collect()
    }

    fn session_entries(step: &Step, graph: &DependencyGraph<'_>) -> Vec<SessionEntry> {
        graph
            .steps()
            .iter()
            .filter(|s| s.order < step.order && s.status == StepStatus::Completed)
            .map(|s| SessionEntry {
                order: s.order,
                agent_name: s.agent_name.clone(),
                action: s.description.clone(),
                result: s.result.clone().unwrap_or(Value::Null),
            })
            .collect()
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(["summarizer"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{plan_with, step};

    fn completed(id: u64, order: u32, agent: &str, deps: &[u64], result: &str) -> Step {
        let mut s = step(id, order, agent, deps, StepStatus::Completed);
        s.result = Some(json!(result));
        s
    }

    fn aapl_steps() -> Vec<Step> {
        vec![
            completed(1, 0, "company", &[], "Apple Inc."),
            completed(2, 1, "fundamentals", &[1], "P/E 28"),
            step(3, 2, "summarizer", &[2], StepStatus::Executing),
        ]
    }

    #[test]
    fn test_synthesis_receives_every_completed_earlier_step() {
        let steps = aapl_steps();
        let context = ContextAssembler::default().assemble(&steps[2], &steps).unwrap();
        let StepContext::Session(entries) = context else {
            panic!("expected session context");
        };
        let orders: Vec<u32> = entries.iter().map(|e| e.order).collect();
        assert_eq!(orders, vec![0, 1]);
        assert_eq!(entries[0].result, json!("Apple Inc."));
        assert_eq!(entries[1].action, "step 2");
    }

    #[test]
    fn test_worker_receives_exactly_declared_dependencies() {
        let mut steps = aapl_steps();
        steps[2].agent_name = "charts".into();
        let context = ContextAssembler::default().assemble(&steps[2], &steps).unwrap();
        assert_eq!(
            context,
            StepContext::DependencyArtifacts(BTreeMap::from([(2, json!("P/E 28"))]))
        );
        let value = context.to_value(&plan_with(steps.clone()));
        assert!(value.get(SESSION_CONTEXT_KEY).is_none());
        assert_eq!(value[DEPENDENCY_ARTIFACTS_KEY]["2"], "P/E 28");
    }

    #[test]
    fn test_synthesis_falls_back_without_completed_steps() {
        let steps = vec![step(1, 0, "summarizer", &[], StepStatus::Executing)];
        let context = ContextAssembler::default().assemble(&steps[0], &steps).unwrap();
        assert_eq!(context, StepContext::DependencyArtifacts(BTreeMap::new()));
    }

    #[test]
    fn test_synthesis_ignores_later_and_unfinished_steps() {
        let steps = vec![
            completed(1, 0, "company", &[], "Apple"),
            step(2, 1, "news", &[], StepStatus::Failed),
            step(3, 2, "summarizer", &[1], StepStatus::Executing),
            completed(4, 3, "charts", &[], "chart"),
        ];
        let StepContext::Session(entries) =
            ContextAssembler::default().assemble(&steps[2], &steps).unwrap()
        else {
            panic!("expected session context");
        };
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].agent_name, "company");
    }

    #[test]
    fn test_unknown_dependency_is_an_error() {
        let steps = vec![step(1, 0, "charts", &[42], StepStatus::Executing)];
        assert!(matches!(
            ContextAssembler::default().assemble(&steps[0], &steps),
            Err(EngineError::CorruptState { .. })
        ));
    }

    #[test]
    fn test_classify_uses_configured_set() {
        let assembler = ContextAssembler::new(["report-writer"]);
        assert_eq!(assembler.classify("report-writer"), AgentClass::Synthesis);
        assert_eq!(assembler.classify("summarizer"), AgentClass::Worker);
    }
}
