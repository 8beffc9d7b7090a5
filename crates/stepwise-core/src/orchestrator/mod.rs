//! The orchestrator facade.
//!
//! [`Orchestrator`] is the single entry point front ends use. It wires the
//! components together and exposes the operations callers need:
//!
//! ```text
//! create_plan ──▶ PlanBuilder ──▶ PlanStore
//! approve_step ─▶ ApprovalGate ──▶ PlanStore
//! execute_plan ─▶ ExecutionDispatcher ──▶ ContextAssembler / AgentRegistry / PlanStore
//! get_status ──▶ StatusReporter ──▶ PlanStore
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use stepwise_core::{
//!     params::{ApproveStep, CreatePlan, ExecutePlan},
//!     planning::StaticProposer,
//!     DispatchSchedule, OrchestratorBuilder,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Arc::new(
//!     OrchestratorBuilder::new()
//!         .with_database_path(Some("/tmp/stepwise.db"))
//!         .with_proposer(Arc::new(StaticProposer::new(r#"{"steps":[]}"#)))
//!         .build()
//!         .await?,
//! );
//!
//! let plan = orchestrator
//!     .create_plan(&CreatePlan {
//!         session_id: "s1".into(),
//!         user_id: "u1".into(),
//!         objective: "Analyze AAPL".into(),
//!         ..Default::default()
//!     })
//!     .await?;
//!
//! orchestrator
//!     .approve_step(&ApproveStep {
//!         session_id: "s1".into(),
//!         step_id: plan.steps[0].id,
//!         approved: true,
//!         feedback: None,
//!     })
//!     .await?;
//!
//! let (mut updates, handle) = orchestrator.execute_plan_stream(ExecutePlan {
//!     session_id: "s1".into(),
//!     plan_id: plan.id,
//!     schedule: DispatchSchedule::default(),
//! });
//! # let _ = &mut updates;
//! let outcome = handle.await??;
//! println!("plan is now {}", outcome.status);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use log::info;
use tokio::{
    sync::mpsc::{self, UnboundedSender},
    task::JoinHandle,
};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{
    agent::AgentRegistry,
    config::EngineConfig,
    dispatch::ExecutionDispatcher,
    error::{EngineError, Result},
    gate::ApprovalGate,
    models::{DraftStep, ExecutionOutcome, Message, NewPlan, Plan, StatusSnapshot, StatusUpdate, Step},
    params::{ApproveStep, CreatePlan, CreatePlanWithSteps, ExecutePlan, ListMessages, PlanRef},
    planning::PlanBuilder,
    status::StatusReporter,
    store::{PlanStore, SessionDeletion},
};

pub mod builder;


pub use builder::OrchestratorBuilder;

/// Entry point for planning, approving, executing and observing plans.
pub struct Orchestrator {
    store: Arc<dyn PlanStore>,
    registry: AgentRegistry,
    planner: Option<PlanBuilder>,
    gate: ApprovalGate,
    dispatcher: ExecutionDispatcher,
    reporter: StatusReporter,
    config: EngineConfig,
}

impl Orchestrator {
    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn PlanStore> {
        &self.store
    }

    /// Plans `objective` with the configured proposer and persists the
    /// plan with every step PENDING.
    ///
    /// # Errors
    ///
    /// `PlanGeneration` when no valid plan was proposed within the attempt
    /// budget; nothing is persisted in that case.
    pub async fn create_plan(&self, params: &CreatePlan) -> Result<Plan> {
        Self::validate_owner(params)?;
        let planner = self.planner.as_ref().ok_or_else(|| EngineError::Configuration {
            message: "no plan proposer configured".to_string(),
        })?;

        let steps = planner.build(&params.objective, &params.file_refs).await?;
        self.persist(params, steps).await
    }

    /// Persists a caller-authored plan after the same validation a proposed
    /// plan goes through.
    ///
    /// # Errors
    ///
    /// `UnknownAgent` for an unregistered agent, `DependencyCycle` for a
    /// self or forward dependency. Nothing is persisted on error.
    pub async fn create_plan_with_steps(&self, params: &CreatePlanWithSteps) -> Result<Plan> {
        Self::validate_owner(&params.plan)?;
        if params.steps.is_empty() {
            return Err(EngineError::invalid_input("steps").with_reason("a plan needs at least one step"));
        }
        for step in &params.steps {
            if step.description.trim().is_empty() {
                return Err(EngineError::invalid_input("description").with_reason("must not be empty"));
            }
            if !self.registry.contains(&step.agent_name) {
                return Err(EngineError::UnknownAgent {
                    name: step.agent_name.clone(),
                });
            }
        }
        self.persist(&params.plan, params.steps.clone()).await
    }

    async fn persist(&self, params: &CreatePlan, steps: Vec<DraftStep>) -> Result<Plan> {
        let plan = self
            .store
            .save_plan(&NewPlan {
                session_id: params.session_id.clone(),
                user_id: params.user_id.clone(),
                objective: params.objective.clone(),
                file_refs: params.file_refs.clone(),
                fail_fast: params.fail_fast,
                steps,
            })
            .await?;
        info!(
            "Created plan {} with {} step(s) in session {}",
            plan.id,
            plan.steps.len(),
            plan.session_id
        );
        Ok(plan)
    }

    fn validate_owner(params: &CreatePlan) -> Result<()> {
        if params.session_id.trim().is_empty() {
            return Err(EngineError::invalid_input("session_id").with_reason("must not be empty"));
        }
        if params.user_id.trim().is_empty() {
            return Err(EngineError::invalid_input("user_id").with_reason("must not be empty"));
        }
        if params.objective.trim().is_empty() {
            return Err(EngineError::invalid_input("objective").with_reason("must not be empty"));
        }
        Ok(())
    }

    /// Approves (`approved: true`) or rejects a step.
    pub async fn approve_step(&self, params: &ApproveStep) -> Result<Step> {
        if params.approved {
            self.gate
                .approve(&params.session_id, params.step_id, params.feedback.clone())
                .await
        } else {
            self.gate
                .reject(&params.session_id, params.step_id, params.feedback.clone())
                .await
        }
    }

    /// Runs the plan, pushing progress events to `updates`.
    pub async fn execute_plan(
        &self,
        params: &ExecutePlan,
        updates: &UnboundedSender<StatusUpdate>,
    ) -> Result<ExecutionOutcome> {
        self.dispatcher
            .run(&params.session_id, params.plan_id, &params.schedule, updates)
            .await
    }

    /// Runs the plan on a background task and streams its progress.
    ///
    /// The stream ends with [`StatusUpdate::Finished`] on success; the join
    /// handle yields the outcome or the error that stopped the run.
    pub fn execute_plan_stream(
        self: &Arc<Self>,
        params: ExecutePlan,
    ) -> (
        UnboundedReceiverStream<StatusUpdate>,
        JoinHandle<Result<ExecutionOutcome>>,
    ) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let orchestrator = Arc::clone(self);
        let handle = tokio::spawn(async move { orchestrator.execute_plan(&params, &sender).await });
        (UnboundedReceiverStream::new(receiver), handle)
    }

    pub async fn get_status(&self, params: &PlanRef) -> Result<StatusSnapshot> {
        self.reporter
            .snapshot(&params.session_id, params.plan_id)
            .await
    }

    pub async fn get_plan(&self, params: &PlanRef) -> Result<Option<Plan>> {
        self.store
            .get_plan(&params.session_id, params.plan_id)
            .await
    }

    pub async fn get_messages(&self, params: &ListMessages) -> Result<Vec<Message>> {
        self.store
            .get_messages(&params.session_id, params.plan_id)
            .await
    }

    /// Stops the plan from starting new steps. Steps already executing
    /// finish normally.
    pub async fn cancel_plan(&self, params: &PlanRef) -> Result<()> {
        self.store
            .request_cancel(&params.session_id, params.plan_id)
            .await?;
        info!("Cancellation requested for plan {}", params.plan_id);
        Ok(())
    }

    /// Removes every plan, step and message of a session.
    pub async fn delete_session(&self, session_id: &str) -> Result<SessionDeletion> {
        let deletion = self.store.delete_session(session_id).await?;
        info!(
            "Deleted session {session_id}: {} plan(s), {} step(s), {} message(s)",
            deletion.plans, deletion.steps, deletion.messages
        );
        Ok(deletion)
    }
}
