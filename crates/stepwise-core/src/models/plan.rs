//! Plan model definition and related functionality.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{PlanStatus, Step};

/// Top-level unit of work produced from one user objective.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    /// Unique identifier for the plan
    pub id: u64,

    /// Session partition the plan belongs to
    pub session_id: String,

    /// User that requested the plan
    pub user_id: String,

    /// Natural-language objective the plan was built from
    pub objective: String,

    /// Aggregate status, derived from the step statuses
    #[serde(default)]
    pub status: PlanStatus,

    /// Whether a single failure fails the whole plan
    #[serde(default)]
    pub fail_fast: bool,

    /// Set by `cancel_plan`; dispatchers start no new steps once set
    #[serde(default)]
    pub cancel_requested: bool,

    /// Files or tool manifests the objective refers to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_refs: Vec<String>,

    /// Why the dispatcher halted the plan (unknown agent, corrupted state,
    /// unresolved write conflict). A halted plan is FAILED.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt_reason: Option<String>,

    /// Final summary, set once the plan completes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Number of COMPLETED steps
    #[serde(default)]
    pub completed_steps: u32,

    /// Number of FAILED steps
    #[serde(default)]
    pub failed_steps: u32,

    /// Optimistic-concurrency version
    #[serde(default)]
    pub version: u64,

    /// Timestamp when the plan was created (UTC)
    pub created_at: Timestamp,

    /// Timestamp when the plan was last modified (UTC)
    pub updated_at: Timestamp,

    /// Steps in order (eagerly loaded by the store)
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Plan {
    /// Ordered list of step ids.
    pub fn step_ids(&self) -> Vec<u64> {
        self.steps.iter().map(|step| step.id).collect()
    }

    /// Total number of steps in the plan.
    pub fn total_steps(&self) -> u32 {
        self.steps.len() as u32
    }
}
