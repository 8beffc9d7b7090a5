//! Core library for the Stepwise plan orchestration engine.
//!
//! Stepwise turns a natural-language objective into a plan of steps, each
//! assigned to a specialist agent, and executes the plan only as far as a
//! human has approved it. Completed results flow to dependent steps and
//! every agent reply lands in an append-only message log.
//!
//! # Components
//!
//! - [`planning`]: `PlanBuilder` asks a proposer for a plan and retries with
//!   corrective feedback until the plan validates
//! - [`graph`]: dependency validation, readiness and approval rules
//! - [`gate`]: approve/reject decisions
//! - [`context`]: what each agent sees (worker vs. synthesis policy)
//! - [`dispatch`]: at-most-once step execution, sequential or concurrent
//! - [`store`]: persistence behind the [`PlanStore`] trait, SQLite by default
//! - [`status`]: read-side progress snapshots
//! - [`orchestrator`]: the facade wiring all of the above
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use stepwise_core::{
//!     models::DraftStep,
//!     params::{CreatePlan, CreatePlanWithSteps, PlanRef},
//!     OrchestratorBuilder,
//! };
//!
//! # async fn example(agent: Arc<dyn stepwise_core::agent::Agent>) -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = OrchestratorBuilder::new()
//!     .with_database_path(Some("stepwise.db"))
//!     .with_agent(agent)
//!     .build()
//!     .await?;
//!
//! let plan = orchestrator
//!     .create_plan_with_steps(&CreatePlanWithSteps {
//!         plan: CreatePlan {
//!             session_id: "s1".to_string(),
//!             user_id: "u1".to_string(),
//!             objective: "Analyze AAPL".to_string(),
//!             ..Default::default()
//!         },
//!         steps: vec![DraftStep::new("Look up the company", "company")],
//!     })
//!     .await?;
//!
//! let status = orchestrator
//!     .get_status(&PlanRef {
//!         session_id: "s1".to_string(),
//!         plan_id: plan.id,
//!     })
//!     .await?;
//! println!("{status}");
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod aggregate;
pub mod config;
pub mod context;
pub mod db;
pub mod dispatch;
pub mod display;
pub mod error;
pub mod gate;
pub mod graph;
pub mod models;
pub mod orchestrator;
pub mod params;
pub mod planning;
pub mod status;
pub mod store;

pub use agent::{Agent, AgentError, AgentRegistry, AgentReply};
pub use config::EngineConfig;
pub use context::{ContextAssembler, StepContext};
pub use db::Database;
pub use dispatch::{DispatchMode, DispatchSchedule, ExecutionDispatcher, RetryPolicy};
pub use display::{ApprovalResult, CreateResult, DeletionResult, Messages, OperationStatus, Steps};
pub use error::{EngineError, Result};
pub use gate::ApprovalGate;
pub use models::{
    DraftStep, ExecutionOutcome, Message, MessageRole, Plan, PlanStatus, StatusSnapshot,
    StatusUpdate, Step, StepStatus,
};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use planning::{PlanBuilder, PlanProposer, StaticProposer};
pub use status::StatusReporter;
pub use store::{PlanStore, SessionDeletion, SqlitePlanStore};

#[cfg(test)]
pub(crate) mod test_support {
    use jiff::Timestamp;

    use crate::models::{Plan, PlanStatus, Step, StepStatus};

    pub(crate) fn step(id: u64, order: u32, agent: &str, deps: &[u64], status: StepStatus) -> Step {
        Step {
            id,
            plan_id: 1,
            session_id: "s1".to_string(),
            order,
            description: format!("step {id}"),
            agent_name: agent.to_string(),
            dependencies: deps.to_vec(),
            status,
            result: None,
            error: None,
            feedback: None,
            attempts: 0,
            version: 0,
            created_at: Timestamp::UNIX_EPOCH,
            updated_at: Timestamp::UNIX_EPOCH,
            started_at: None,
            finished_at: None,
        }
    }

    pub(crate) fn plan_with(steps: Vec<Step>) -> Plan {
        Plan {
            id: 1,
            session_id: "s1".to_string(),
            user_id: "u1".to_string(),
            objective: "Analyze AAPL".to_string(),
            status: PlanStatus::PendingApproval,
            fail_fast: false,
            cancel_requested: false,
            file_refs: Vec::new(),
            halt_reason: None,
            summary: None,
            completed_steps: 0,
            failed_steps: 0,
            version: 0,
            created_at: Timestamp::UNIX_EPOCH,
            updated_at: Timestamp::UNIX_EPOCH,
            steps,
        }
    }
}
