//! Engine tunables.

use std::time::Duration;

use crate::dispatch::RetryPolicy;

/// Every knob of the engine, with production defaults.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Planner attempts before giving up with `PlanGeneration`
    pub max_plan_attempts: u32,
    /// Fewest steps a generated plan may have
    pub min_steps: usize,
    /// Most steps a generated plan may have
    pub max_steps: usize,
    /// Retry policy for transient agent failures
    pub retry: RetryPolicy,
    /// Upper bound on a single agent invocation
    pub agent_timeout: Duration,
    /// Largest concurrent batch
    pub max_parallel: usize,
    /// Reload-and-reapply attempts after an optimistic-concurrency conflict
    pub conflict_retries: u32,
    /// How long a dispatcher's plan lease lives without renewal
    pub lease_ttl: Duration,
    /// Messages included in a status snapshot
    pub message_window: usize,
    /// Agents that receive the full session context
    pub synthesis_agents: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_plan_attempts: 3,
            min_steps: 3,
            max_steps: 8,
            retry: RetryPolicy::default(),
            agent_timeout: Duration::from_secs(120),
            max_parallel: 4,
            conflict_retries: 3,
            lease_ttl: Duration::from_secs(300),
            message_window: 20,
            synthesis_agents: vec!["summarizer".to_string()],
        }
    }
}
