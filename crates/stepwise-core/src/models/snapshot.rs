//! Read-side projections and execution events.

use serde::{Deserialize, Serialize};

use super::{Message, PlanStatus, Step, StepStatus};

/// Compact view of a step for progress reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepProgress {
    pub id: u64,
    pub order: u32,
    pub agent_name: String,
    pub description: String,
    pub status: StepStatus,
}

impl From<&Step> for StepProgress {
    fn from(step: &Step) -> Self {
        Self {
            id: step.id,
            order: step.order,
            agent_name: step.agent_name.clone(),
            description: step.description.clone(),
            status: step.status,
        }
    }
}

/// Point-in-time progress of a plan, recomputed from the store on every
/// query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusSnapshot {
    pub plan_id: u64,
    pub objective: String,
    pub status: PlanStatus,
    pub completed_steps: u32,
    pub total_steps: u32,
    /// `completed_steps / total_steps` as a percentage, one decimal
    pub progress_percentage: f64,
    /// Steps currently executing, or the next steps waiting on a decision
    pub current_steps: Vec<StepProgress>,
    /// PENDING steps whose dependencies are complete
    pub awaiting_approval: Vec<StepProgress>,
    pub cancel_requested: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Most recent messages, oldest first
    pub recent_messages: Vec<Message>,
}

/// Result of one dispatcher run over a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionOutcome {
    pub plan_id: u64,
    pub status: PlanStatus,
    /// Steps that ran to COMPLETED or FAILED during this run, in dispatch
    /// order
    pub executed: Vec<u64>,
    /// PENDING steps that need an approval before the plan can progress
    pub awaiting_approval: Vec<u64>,
    pub cancelled: bool,
}

/// Event emitted while a plan executes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusUpdate {
    StepStarted {
        step_id: u64,
        order: u32,
        agent_name: String,
    },
    StepRetrying {
        step_id: u64,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    StepCompleted {
        step_id: u64,
        order: u32,
    },
    StepFailed {
        step_id: u64,
        order: u32,
        error: String,
    },
    StepsBlocked {
        step_ids: Vec<u64>,
    },
    PlanStatusChanged {
        plan_id: u64,
        status: PlanStatus,
    },
    Finished(ExecutionOutcome),
}
