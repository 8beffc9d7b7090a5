//! Parameter structures for orchestrator operations.
//!
//! These are plain structs without framework derives so any front end (the
//! CLI today, an HTTP layer tomorrow) can wrap them with its own argument
//! types and convert with `From`/`Into`:
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐
//! │   CLI Args      │    │  Core Params    │
//! │  (clap derives) │───▶│ (minimal deps)  │
//! └─────────────────┘    └─────────────────┘
//! ```

use crate::{dispatch::DispatchSchedule, models::DraftStep};

/// Parameters for planning an objective.
#[derive(Debug, Clone, Default)]
pub struct CreatePlan {
    pub session_id: String,
    pub user_id: String,
    pub objective: String,
    /// Files or tool manifests the objective refers to
    pub file_refs: Vec<String>,
    /// Fail the whole plan on the first failed or rejected step
    pub fail_fast: bool,
}

/// Parameters for persisting a caller-authored plan.
#[derive(Debug, Clone, Default)]
pub struct CreatePlanWithSteps {
    pub plan: CreatePlan,
    pub steps: Vec<DraftStep>,
}

/// An approval decision on a step.
#[derive(Debug, Clone)]
pub struct ApproveStep {
    pub session_id: String,
    pub step_id: u64,
    /// `false` rejects the step
    pub approved: bool,
    /// Approver's note; the rejection reason when `approved` is false
    pub feedback: Option<String>,
}

/// Parameters for running a plan.
#[derive(Debug, Clone)]
pub struct ExecutePlan {
    pub session_id: String,
    pub plan_id: u64,
    pub schedule: DispatchSchedule,
}

/// Identifies a plan within a session.
#[derive(Debug, Clone)]
pub struct PlanRef {
    pub session_id: String,
    pub plan_id: u64,
}

/// Parameters for listing messages.
#[derive(Debug, Clone)]
pub struct ListMessages {
    pub session_id: String,
    /// Restrict to one plan
    pub plan_id: Option<u64>,
}
