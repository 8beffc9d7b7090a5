//! Turning an objective into an ordered, acyclic set of draft steps.
//!
//! A [`PlanProposer`] (typically a language model) suggests a plan as text.
//! [`PlanBuilder`] parses and validates the suggestion against the agent
//! registry; when it is refused, the proposer is asked again with the
//! reason attached, up to `max_attempts` times.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;

use crate::{
    agent::AgentRegistry,
    config::EngineConfig,
    error::{EngineError, Result},
    models::DraftStep,
};

pub mod proposal;

pub use proposal::{extract_json, parse_proposal, ProposalError, ProposalRequest};

/// Source of candidate plans.
#[async_trait]
pub trait PlanProposer: Send + Sync {
    /// Returns the raw proposal text for `request`.
    async fn propose(&self, request: &ProposalRequest<'_>) -> std::result::Result<String, String>;
}

/// Replays fixed responses in order, repeating the last one.
#[derive(Debug, Default)]
pub struct StaticProposer {
    responses: Vec<String>,
    next: AtomicUsize,
}

impl StaticProposer {
    pub fn new(response: impl Into<String>) -> Self {
        Self::sequence([response])
    }

    pub fn sequence<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: responses.into_iter().map(Into::into).collect(),
            next: AtomicUsize::new(0),
        }
    }

    /// Number of proposals handed out so far.
    pub fn calls(&self) -> usize {
        self.next.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlanProposer for StaticProposer {
    async fn propose(&self, _request: &ProposalRequest<'_>) -> std::result::Result<String, String> {
        let index = self.next.fetch_add(1, Ordering::SeqCst);
        self.responses
            .get(index)
            .or_else(|| self.responses.last())
            .cloned()
            .ok_or_else(|| "no proposal configured".to_string())
    }
}

/// Validating, retrying plan generator.
#[derive(Clone)]
pub struct PlanBuilder {
    proposer: Arc<dyn PlanProposer>,
    registry: AgentRegistry,
    max_attempts: u32,
    min_steps: usize,
    max_steps: usize,
}

impl PlanBuilder {
    pub fn new(proposer: Arc<dyn PlanProposer>, registry: AgentRegistry, config: &EngineConfig) -> Self {
        Self {
            proposer,
            registry,
            max_attempts: config.max_plan_attempts.max(1),
            min_steps: config.min_steps,
            max_steps: config.max_steps,
        }
    }

    /// Produces validated draft steps for `objective`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::PlanGeneration` carrying the last refusal
    /// reason once every attempt has been refused.
    pub async fn build(&self, objective: &str, file_refs: &[String]) -> Result<Vec<DraftStep>> {
        if objective.trim().is_empty() {
            return Err(EngineError::invalid_input("objective").with_reason("must not be empty"));
        }

        let catalog = self.registry.catalog();
        let mut correction: Option<String> = None;

        for attempt in 1..=self.max_attempts {
            let request = ProposalRequest {
                objective,
                file_refs,
                catalog: &catalog,
                min_steps: self.min_steps,
                max_steps: self.max_steps,
                attempt,
                correction: correction.as_deref(),
            };

            let outcome = match self.proposer.propose(&request).await {
                Ok(text) => parse_proposal(&text, &self.registry, self.min_steps, self.max_steps),
                Err(e) => Err(ProposalError::Proposer(e)),
            };

            match outcome {
                Ok(steps) => {
                    log::info!(
                        "Plan proposal accepted on attempt {attempt} with {} steps",
                        steps.len()
                    );
                    return Ok(steps);
                }
                Err(e) => {
                    log::warn!("Plan proposal attempt {attempt} refused: {e}");
                    correction = Some(e.to_string());
                }
            }
        }

        Err(EngineError::PlanGeneration {
            attempts: self.max_attempts,
            reason: correction.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::agent::{Agent, AgentError, AgentReply};

    struct Worker(&'static str);

    #[async_trait]
    impl Agent for Worker {
        fn name(&self) -> &str {
            self.0
        }

        fn capabilities(&self) -> Vec<String> {
            Vec::new()
        }

        async fn run(&self, _task: &str, _context: &Value) -> std::result::Result<AgentReply, AgentError> {
            Ok(AgentReply::text(""))
        }
    }

    const VALID: &str = r#"{"steps":[
        {"description":"Resolve","agent":"company"},
        {"description":"Fundamentals","agent":"fundamentals","depends_on":[0]},
        {"description":"Summary","agent":"summarizer","depends_on":[1]}]}"#;

    fn builder(proposer: Arc<StaticProposer>) -> PlanBuilder {
        let registry = AgentRegistry::new()
            .with(Arc::new(Worker("company")))
            .with(Arc::new(Worker("fundamentals")))
            .with(Arc::new(Worker("summarizer")));
        PlanBuilder::new(proposer, registry, &EngineConfig::default())
    }

    #[tokio::test]
    async fn test_retry_after_invalid_proposal() {
        let proposer = Arc::new(StaticProposer::sequence(["not a plan", VALID]));
        let steps = builder(proposer.clone()).build("Analyze AAPL", &[]).await.unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[2].depends_on, vec![1]);
        assert_eq!(proposer.calls(), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let proposer = Arc::new(StaticProposer::new(r#"{"steps":[]}"#));
        let err = builder(proposer.clone()).build("Analyze AAPL", &[]).await.unwrap_err();
        assert!(matches!(err, EngineError::PlanGeneration { attempts: 3, .. }));
        assert!(err.to_string().contains("0 steps"));
        assert_eq!(proposer.calls(), 3);
    }

    #[tokio::test]
    async fn test_empty_objective_is_invalid_input() {
        let proposer = Arc::new(StaticProposer::new(VALID));
        assert!(matches!(
            builder(proposer).build("  ", &[]).await,
            Err(EngineError::InvalidInput { .. })
        ));
    }
}
