//! Human approval and rejection of steps.
//!
//! Approval is the only way a step leaves PENDING; nothing in the engine
//! approves on a timer or on its own. Both operations are idempotent and
//! never append to the message log.

use std::sync::Arc;

use jiff::Timestamp;
use log::{debug, info};

use crate::{
    aggregate::refresh_plan,
    context::ContextAssembler,
    error::{EngineError, Result},
    graph::{ApprovalCheck, DependencyGraph, RejectionCheck},
    models::{Plan, Step, StepStatus},
    store::PlanStore,
};

/// Applies approve/reject decisions through the store.
#[derive(Clone)]
pub struct ApprovalGate {
    store: Arc<dyn PlanStore>,
    assembler: Arc<ContextAssembler>,
    conflict_retries: u32,
}

impl ApprovalGate {
    pub fn new(
        store: Arc<dyn PlanStore>,
        assembler: Arc<ContextAssembler>,
        conflict_retries: u32,
    ) -> Self {
        Self {
            store,
            assembler,
            conflict_retries,
        }
    }

    /// PENDING → APPROVED.
    ///
    /// Approving an APPROVED step returns it unchanged.
    ///
    /// # Errors
    ///
    /// `ApprovalState` if the step is in any other state, a dependency has
    /// not completed, or the plan has already finished.
    pub async fn approve(
        &self,
        session_id: &str,
        step_id: u64,
        feedback: Option<String>,
    ) -> Result<Step> {
        let mut attempt = 0;
        loop {
            let (plan, step) = self.load(session_id, step_id).await?;
            let graph = DependencyGraph::new(&plan.steps);
            if graph.check_approval(step_id)? == ApprovalCheck::AlreadyApproved {
                debug!("Step {step_id} already approved");
                return Ok(step);
            }
            Self::ensure_open(&plan, &step, "approved")?;

            let mut approved = step;
            approved.status = StepStatus::Approved;
            if feedback.is_some() {
                approved.feedback.clone_from(&feedback);
            }

            match self.store.save_step(&approved).await {
                Ok(saved) => {
                    info!("Step {step_id} of plan {} approved", plan.id);
                    self.refresh(session_id, plan.id).await?;
                    return Ok(saved);
                }
                Err(EngineError::PersistenceConflict { .. }) if attempt < self.conflict_retries => {
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// → REJECTED, skipping every open step that transitively depends on
    /// it. Rejecting a REJECTED step returns it unchanged.
    ///
    /// # Errors
    ///
    /// `ApprovalState` if the step is executing or already finished, or
    /// the plan has already finished.
    pub async fn reject(
        &self,
        session_id: &str,
        step_id: u64,
        reason: Option<String>,
    ) -> Result<Step> {
        let mut attempt = 0;
        loop {
            let (plan, step) = self.load(session_id, step_id).await?;
            let graph = DependencyGraph::new(&plan.steps);
            let skip = match graph.check_rejection(step_id)? {
                RejectionCheck::AlreadyRejected => {
                    debug!("Step {step_id} already rejected");
                    return Ok(step);
                }
                RejectionCheck::Reject { skip } => skip,
            };
            Self::ensure_open(&plan, &step, "rejected")?;

            let now = Timestamp::now();
            let mut rejected = step;
            rejected.status = StepStatus::Rejected;
            rejected.feedback.clone_from(&reason);
            rejected.finished_at = Some(now);

            let mut writes = vec![rejected];
            writes.extend(plan.steps.iter().filter(|s| skip.contains(&s.id)).map(|s| {
                let mut skipped = s.clone();
                skipped.status = StepStatus::Skipped;
                skipped.error = Some(format!("Skipped: depends on rejected step {step_id}"));
                skipped.finished_at = Some(now);
                skipped
            }));

            match self.store.save_steps(&writes).await {
                Ok(saved) => {
                    info!(
                        "Step {step_id} of plan {} rejected; {} dependent step(s) skipped",
                        plan.id,
                        skip.len()
                    );
                    self.refresh(session_id, plan.id).await?;
                    return saved
                        .into_iter()
                        .next()
                        .ok_or(EngineError::StepNotFound { id: step_id });
                }
                Err(EngineError::PersistenceConflict { .. }) if attempt < self.conflict_retries => {
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn load(&self, session_id: &str, step_id: u64) -> Result<(Plan, Step)> {
        let step = self
            .store
            .get_step(session_id, step_id)
            .await?
            .ok_or(EngineError::StepNotFound { id: step_id })?;
        let plan = self
            .store
            .get_plan(session_id, step.plan_id)
            .await?
            .ok_or(EngineError::PlanNotFound { id: step.plan_id })?;
        Ok((plan, step))
    }

    fn ensure_open(plan: &Plan, step: &Step, action: &'static str) -> Result<()> {
        if plan.status.is_terminal() {
            return Err(EngineError::ApprovalState {
                step_id: step.id,
                action,
                status: step.status,
                reason: format!("plan {} is already {}", plan.id, plan.status.as_str()),
            });
        }
        Ok(())
    }

    async fn refresh(&self, session_id: &str, plan_id: u64) -> Result<Plan> {
        refresh_plan(
            self.store.as_ref(),
            &self.assembler,
            session_id,
            plan_id,
            self.conflict_retries,
        )
        .await
    }
}
