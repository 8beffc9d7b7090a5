//! Step execution.
//!
//! [`ExecutionDispatcher::run`] drives one plan until nothing more can run
//! without a human decision:
//!
//! 1. take the plan lease (one dispatcher per plan);
//! 2. recompute the plan aggregate and stop if it is terminal or cancelled;
//! 3. pick the next batch of ready steps per the [`DispatchSchedule`],
//!    holding back synthesis steps while a lower-order step is still open;
//! 4. claim each step (APPROVED → EXECUTING compare-and-set), invoke its
//!    agent with retries, persist COMPLETED/FAILED and append a message;
//! 5. wait for the whole batch, block the dependents of failed steps, and
//!    go back to 2.
//!
//! Step failures are recorded on the step. Contract violations (an unknown
//! agent, corrupted state, a write conflict that does not resolve) halt the
//! plan: it is marked FAILED with a `halt_reason` and the error is returned.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::stream::{FuturesUnordered, StreamExt};
use jiff::Timestamp;
use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::{sync::mpsc::UnboundedSender, time};
use uuid::Uuid;

use crate::{
    agent::{Agent, AgentError, AgentRegistry, AgentReply},
    aggregate::refresh_plan,
    config::EngineConfig,
    context::ContextAssembler,
    error::{EngineError, Result},
    graph::DependencyGraph,
    models::{ExecutionOutcome, NewMessage, Plan, PlanStatus, StatusUpdate, Step, StepStatus},
    store::PlanStore,
};

pub mod retry;
pub mod schedule;

pub use retry::RetryPolicy;
pub use schedule::{DispatchMode, DispatchSchedule, Phase};

const MIN_LEASE_RENEWAL: Duration = Duration::from_millis(50);

/// Executes approved steps of a plan.
#[derive(Clone)]
pub struct ExecutionDispatcher {
    store: Arc<dyn PlanStore>,
    registry: AgentRegistry,
    assembler: Arc<ContextAssembler>,
    retry: RetryPolicy,
    agent_timeout: Duration,
    max_parallel: usize,
    conflict_retries: u32,
    lease_ttl: Duration,
}

/// Per-run state shared by the batch loop.
struct Run<'a> {
    session_id: &'a str,
    plan_id: u64,
    lease: String,
    updates: &'a UnboundedSender<StatusUpdate>,
    executed: Vec<u64>,
    last_status: Option<PlanStatus>,
    /// Set once a renewal finds another owner on the lease
    lease_lost: AtomicBool,
}

/// What happened to one batch.
#[derive(Default)]
struct BatchReport {
    /// Steps that reached COMPLETED or FAILED, in completion order
    finished: Vec<u64>,
    failed: Vec<u64>,
    /// First error that prevented a step from being recorded
    error: Option<EngineError>,
}

impl Run<'_> {
    fn lease_lost(&self) -> bool {
        self.lease_lost.load(Ordering::SeqCst)
    }

    fn emit(&self, update: StatusUpdate) {
        // a dropped receiver only means nobody is watching
        let _ = self.updates.send(update);
    }

    fn outcome(&self, plan: &Plan, cancelled: bool) -> ExecutionOutcome {
        let graph = DependencyGraph::new(&plan.steps);
        ExecutionOutcome {
            plan_id: plan.id,
            status: plan.status,
            executed: self.executed.clone(),
            awaiting_approval: graph.awaiting_approval().iter().map(|s| s.id).collect(),
            cancelled,
        }
    }
}

impl ExecutionDispatcher {
    pub fn new(
        store: Arc<dyn PlanStore>,
        registry: AgentRegistry,
        assembler: Arc<ContextAssembler>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            registry,
            assembler,
            retry: config.retry,
            agent_timeout: config.agent_timeout,
            max_parallel: config.max_parallel.max(1),
            conflict_retries: config.conflict_retries,
            lease_ttl: config.lease_ttl,
        }
    }

    /// Runs every step that can run, then reports where the plan stands.
    ///
    /// Returns when the plan is terminal, cancellation has been observed,
    /// or the remaining steps wait on approvals.
    ///
    /// # Errors
    ///
    /// - `PlanNotFound` if the plan is not part of the session
    /// - `LeaseHeld` if another dispatcher owns the plan
    /// - the halting error, after the plan has been marked FAILED
    pub async fn run(
        &self,
        session_id: &str,
        plan_id: u64,
        schedule: &DispatchSchedule,
        updates: &UnboundedSender<StatusUpdate>,
    ) -> Result<ExecutionOutcome> {
        if self.store.get_plan(session_id, plan_id).await?.is_none() {
            return Err(EngineError::PlanNotFound { id: plan_id });
        }

        let mut run = Run {
            session_id,
            plan_id,
            lease: Uuid::new_v4().to_string(),
            updates,
            executed: Vec::new(),
            last_status: None,
            lease_lost: AtomicBool::new(false),
        };
        if !self
            .store
            .acquire_lease(plan_id, &run.lease, self.lease_ttl)
            .await?
        {
            return Err(EngineError::LeaseHeld { plan_id });
        }
        debug!("Acquired lease {} on plan {plan_id}", run.lease);

        let result = match self.drive(&mut run, schedule).await {
            Err(e) if e.halts_plan() => self.halt(&mut run, e).await,
            other => other,
        };

        match self.store.release_lease(plan_id, &run.lease).await {
            Ok(()) => debug!("Released lease {} on plan {plan_id}", run.lease),
            Err(e) => warn!("Failed to release lease on plan {plan_id}: {e}"),
        }

        let outcome = result?;
        info!(
            "Dispatch of plan {plan_id} finished: {} ({} step(s) executed, {} awaiting approval)",
            outcome.status,
            outcome.executed.len(),
            outcome.awaiting_approval.len()
        );
        run.emit(StatusUpdate::Finished(outcome.clone()));
        Ok(outcome)
    }

    async fn drive(&self, run: &mut Run<'_>, schedule: &DispatchSchedule) -> Result<ExecutionOutcome> {
        self.recover_interrupted(run).await?;

        loop {
            if !self
                .store
                .acquire_lease(run.plan_id, &run.lease, self.lease_ttl)
                .await?
            {
                return Err(EngineError::LeaseHeld {
                    plan_id: run.plan_id,
                });
            }

            let plan = self.refresh(run).await?;

            if plan.status.is_terminal() {
                return Ok(run.outcome(&plan, false));
            }
            if plan.cancel_requested {
                info!("Plan {} cancelled; no further steps will start", plan.id);
                self.store
                    .append_message(&NewMessage::system(
                        run.session_id,
                        plan.id,
                        "Execution cancelled; steps not yet started were left as they are",
                    ))
                    .await?;
                return Ok(run.outcome(&plan, true));
            }

            let graph = DependencyGraph::new(&plan.steps);
            graph.validate()?;
            let ready: Vec<&Step> = graph
                .ready_steps()
                .into_iter()
                .filter(|step| !self.defers(&graph, step))
                .collect();
            let batch: Vec<Step> = schedule
                .select_batch(&ready, self.max_parallel)
                .into_iter()
                .cloned()
                .collect();
            if batch.is_empty() {
                return Ok(run.outcome(&plan, false));
            }
            debug!(
                "Dispatching {} step(s) of plan {} ({})",
                batch.len(),
                plan.id,
                schedule.mode_for(batch[0].order)
            );

            let report = self.execute_batch(run, &plan, &batch).await;
            run.executed.extend(report.finished);
            if run.lease_lost() {
                warn!("Plan {}: lease lost, leaving the plan to its new owner", run.plan_id);
                return Err(EngineError::LeaseHeld {
                    plan_id: run.plan_id,
                });
            }
            if let Some(e) = report.error {
                return Err(e);
            }
            if !report.failed.is_empty() {
                self.block_dependents(run, &report.failed).await?;
            }
        }
    }

    /// Whether a ready synthesis step has to wait for lower-order steps that
    /// are still open, so its session context sees their results.
    fn defers(&self, graph: &DependencyGraph<'_>, step: &Step) -> bool {
        self.assembler.is_synthesis(&step.agent_name) && graph.has_open_predecessor(step)
    }

    /// Runs a batch and waits for every step of it, whatever their
    /// individual outcome.
    async fn execute_batch(&self, run: &Run<'_>, plan: &Plan, batch: &[Step]) -> BatchReport {
        let mut in_flight: FuturesUnordered<_> = batch
            .iter()
            .map(|step| async move { (step.id, self.execute_step(run, plan, step).await) })
            .collect();

        // keep the lease alive while slow agents run
        let mut renew = time::interval((self.lease_ttl / 3).max(MIN_LEASE_RENEWAL));
        renew.tick().await;

        let mut report = BatchReport::default();
        loop {
            tokio::select! {
                next = in_flight.next() => {
                    let Some((step_id, result)) = next else {
                        break;
                    };
                    match result {
                        Ok(Some(step)) => {
                            report.finished.push(step.id);
                            if step.status == StepStatus::Failed {
                                report.failed.push(step.id);
                            }
                        }
                        Ok(None) => debug!("Step {step_id} is no longer claimable; skipped"),
                        Err(e) => {
                            error!("Step {step_id} could not be executed: {e}");
                            report.error.get_or_insert(e);
                        }
                    }
                }
                _ = renew.tick() => {
                    match self.store.acquire_lease(run.plan_id, &run.lease, self.lease_ttl).await {
                        Ok(true) => debug!("Renewed lease on plan {}", run.plan_id),
                        Ok(false) => {
                            warn!(
                                "Lease on plan {} was taken over mid-batch; no further claims",
                                run.plan_id
                            );
                            run.lease_lost.store(true, Ordering::SeqCst);
                        }
                        Err(e) => warn!("Failed to renew lease on plan {}: {e}", run.plan_id),
                    }
                }
            }
        }
        report
    }

    /// Claims, runs and records one step.
    ///
    /// Returns `None` if the claim was lost, which means another task is
    /// already executing the step, or if the plan lease was lost.
    async fn execute_step(&self, run: &Run<'_>, plan: &Plan, step: &Step) -> Result<Option<Step>> {
        let agent = match self.registry.resolve(&step.agent_name) {
            Ok(agent) => agent,
            Err(e) => {
                let mut failed = step.clone();
                failed.status = StepStatus::Failed;
                failed.error = Some(e.to_string());
                failed.finished_at = Some(Timestamp::now());
                self.store.save_step(&failed).await?;
                return Err(e);
            }
        };
        let context = self.assembler.assemble(step, &plan.steps)?.to_value(plan);

        if run.lease_lost() {
            return Ok(None);
        }
        let Some(claimed) = self.store.claim_step(run.session_id, step.id).await? else {
            return Ok(None);
        };
        info!(
            "Step {} (order {}) of plan {} claimed for agent '{}'",
            claimed.id, claimed.order, claimed.plan_id, claimed.agent_name
        );
        run.emit(StatusUpdate::StepStarted {
            step_id: claimed.id,
            order: claimed.order,
            agent_name: claimed.agent_name.clone(),
        });

        let (outcome, attempts) = self.invoke(run, agent.as_ref(), &claimed, &context).await;

        let claimed_id = claimed.id;
        let mut finished = claimed;
        finished.attempts += attempts;
        finished.finished_at = Some(Timestamp::now());
        let content = match &outcome {
            Ok(reply) => {
                finished.status = StepStatus::Completed;
                finished.result = Some(reply.content.clone());
                finished.error = None;
                reply.raw()
            }
            Err(e) => {
                let error = EngineError::AgentExecution {
                    step_id: finished.id,
                    agent: finished.agent_name.clone(),
                    source: e.clone(),
                };
                finished.status = StepStatus::Failed;
                finished.error = Some(e.to_string());
                format!("Error: {error}")
            }
        };

        let saved = match self.save_finished(finished).await {
            Ok(saved) => saved,
            Err(e) => {
                if !self.check_lease_lost(run).await {
                    return Err(e);
                }
                warn!(
                    "Dropping the result of step {claimed_id}: lease on plan {} was lost ({e})",
                    run.plan_id
                );
                return Ok(None);
            }
        };
        self.store
            .append_message(&NewMessage::assistant(
                run.session_id,
                saved.plan_id,
                saved.id,
                &saved.agent_name,
                content,
            ))
            .await?;

        match saved.status {
            StepStatus::Completed => {
                info!("Step {} completed after {} attempt(s)", saved.id, saved.attempts);
                run.emit(StatusUpdate::StepCompleted {
                    step_id: saved.id,
                    order: saved.order,
                });
            }
            _ => {
                warn!("Step {} failed: {}", saved.id, saved.error.as_deref().unwrap_or(""));
                run.emit(StatusUpdate::StepFailed {
                    step_id: saved.id,
                    order: saved.order,
                    error: saved.error.clone().unwrap_or_default(),
                });
            }
        }
        Ok(Some(saved))
    }

    /// Calls the agent, retrying transient failures. Returns the final
    /// result and the number of invocations made.
    async fn invoke(
        &self,
        run: &Run<'_>,
        agent: &dyn Agent,
        step: &Step,
        context: &Value,
    ) -> (std::result::Result<AgentReply, AgentError>, u32) {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match time::timeout(self.agent_timeout, agent.run(&step.description, context)).await {
                Ok(result) => result,
                Err(_) => Err(AgentError::Timeout(self.agent_timeout)),
            };

            let error = match result {
                Ok(reply) => return (Ok(reply), attempt),
                Err(e) => e,
            };
            let Some(delay) = self.retry.next_delay(attempt, &error) else {
                return (Err(error), attempt);
            };

            warn!(
                "Step {} attempt {attempt} failed ({error}); retrying in {}ms",
                step.id,
                delay.as_millis()
            );
            run.emit(StatusUpdate::StepRetrying {
                step_id: step.id,
                attempt,
                delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error: error.to_string(),
            });
            if !delay.is_zero() {
                time::sleep(delay).await;
            }
        }
    }

    /// Whether the lease has been lost, renewing it when it is still ours.
    async fn check_lease_lost(&self, run: &Run<'_>) -> bool {
        if run.lease_lost() {
            return true;
        }
        match self.store.acquire_lease(run.plan_id, &run.lease, self.lease_ttl).await {
            Ok(false) => {
                run.lease_lost.store(true, Ordering::SeqCst);
                true
            }
            Ok(true) | Err(_) => false,
        }
    }

    /// Persists a finished step, reapplying the outcome onto a fresh copy
    /// after a version conflict.
    async fn save_finished(&self, finished: Step) -> Result<Step> {
        let mut candidate = finished.clone();
        let mut attempt = 0;
        loop {
            match self.store.save_step(&candidate).await {
                Ok(saved) => return Ok(saved),
                Err(EngineError::PersistenceConflict { .. }) if attempt < self.conflict_retries => {
                    attempt += 1;
                    let current = self
                        .store
                        .get_step(&finished.session_id, finished.id)
                        .await?
                        .ok_or(EngineError::StepNotFound { id: finished.id })?;
                    if current.status != StepStatus::Executing {
                        return Err(EngineError::corrupt(format!(
                            "step {} left EXECUTING while its agent was running (now {})",
                            current.id, current.status
                        )));
                    }
                    candidate = Step {
                        version: current.version,
                        ..finished.clone()
                    };
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Moves the open dependents of failed steps to BLOCKED.
    async fn block_dependents(&self, run: &Run<'_>, failed: &[u64]) -> Result<()> {
        let mut attempt = 0;
        loop {
            let steps = self
                .store
                .get_steps_by_plan(run.plan_id, run.session_id)
                .await?;
            let graph = DependencyGraph::new(&steps);
            let now = Timestamp::now();
            let mut writes: Vec<Step> = Vec::new();
            for &failed_id in failed {
                for id in graph.open_dependents(failed_id) {
                    if writes.iter().any(|s| s.id == id) {
                        continue;
                    }
                    if let Some(step) = graph.get(id) {
                        let mut blocked = step.clone();
                        blocked.status = StepStatus::Blocked;
                        blocked.error = Some(format!("Blocked: dependency step {failed_id} failed"));
                        blocked.finished_at = Some(now);
                        writes.push(blocked);
                    }
                }
            }
            if writes.is_empty() {
                return Ok(());
            }

            match self.store.save_steps(&writes).await {
                Ok(saved) => {
                    let step_ids: Vec<u64> = saved.iter().map(|s| s.id).collect();
                    info!("Blocked step(s) {step_ids:?} of plan {}", run.plan_id);
                    run.emit(StatusUpdate::StepsBlocked { step_ids });
                    return Ok(());
                }
                Err(EngineError::PersistenceConflict { .. }) if attempt < self.conflict_retries => {
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Fails steps left EXECUTING by a dispatcher that lost its lease.
    ///
    /// Holding the lease means no other dispatcher is running this plan, so
    /// such steps will never finish. They are not re-run: their agent may
    /// already have been invoked.
    async fn recover_interrupted(&self, run: &Run<'_>) -> Result<()> {
        let steps = self
            .store
            .get_steps_by_plan(run.plan_id, run.session_id)
            .await?;
        let now = Timestamp::now();
        let interrupted: Vec<Step> = steps
            .iter()
            .filter(|s| s.status == StepStatus::Executing)
            .map(|s| Step {
                status: StepStatus::Failed,
                error: Some("Interrupted: the dispatcher running this step stopped".to_string()),
                finished_at: Some(now),
                ..s.clone()
            })
            .collect();
        if interrupted.is_empty() {
            return Ok(());
        }

        let failed: Vec<u64> = interrupted.iter().map(|s| s.id).collect();
        warn!("Plan {}: failing interrupted step(s) {failed:?}", run.plan_id);
        self.store.save_steps(&interrupted).await?;
        for step in &interrupted {
            self.store
                .append_message(&NewMessage::assistant(
                    run.session_id,
                    run.plan_id,
                    step.id,
                    &step.agent_name,
                    step.error.clone().unwrap_or_default(),
                ))
                .await?;
        }
        self.block_dependents(run, &failed).await
    }

    /// Recomputes and persists the plan aggregate, reporting status changes.
    async fn refresh(&self, run: &mut Run<'_>) -> Result<Plan> {
        let plan = refresh_plan(
            self.store.as_ref(),
            &self.assembler,
            run.session_id,
            run.plan_id,
            self.conflict_retries,
        )
        .await?;
        if run.last_status != Some(plan.status) {
            run.last_status = Some(plan.status);
            run.emit(StatusUpdate::PlanStatusChanged {
                plan_id: plan.id,
                status: plan.status,
            });
        }
        Ok(plan)
    }

    /// Marks the plan FAILED with `cause` as its halt reason, then returns
    /// `cause`.
    async fn halt(&self, run: &mut Run<'_>, cause: EngineError) -> Result<ExecutionOutcome> {
        error!("Halting plan {}: {cause}", run.plan_id);
        let reason = cause.to_string();
        let mut attempt = 0;
        loop {
            let Some(mut plan) = self.store.get_plan(run.session_id, run.plan_id).await? else {
                return Err(cause);
            };
            plan.halt_reason = Some(reason.clone());
            plan.status = PlanStatus::Failed;
            match self.store.update_plan(&plan).await {
                Ok(_) => break,
                Err(EngineError::PersistenceConflict { .. }) if attempt < self.conflict_retries => {
                    attempt += 1;
                }
                Err(e) => {
                    error!("Could not record halt of plan {}: {e}", run.plan_id);
                    return Err(cause);
                }
            }
        }

        self.store
            .append_message(&NewMessage::system(
                run.session_id,
                run.plan_id,
                format!("Plan halted: {reason}"),
            ))
            .await?;
        self.refresh(run).await?;
        Err(cause)
    }
}
