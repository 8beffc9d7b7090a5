//! Keeps a plan's derived fields in step with its steps.

use log::{debug, info};

use crate::{
    context::ContextAssembler,
    error::{EngineError, Result},
    graph::derive_plan_status,
    models::{Plan, PlanStatus, Step, StepStatus},
    store::PlanStore,
};

/// Recomputes status, counters and summary from `steps`.
///
/// Returns `true` if anything changed.
pub fn apply(plan: &mut Plan, steps: &[Step], assembler: &ContextAssembler) -> bool {
    let status = if plan.halt_reason.is_some() {
        PlanStatus::Failed
    } else {
        derive_plan_status(steps, plan.fail_fast)
    };
    let completed = count(steps, StepStatus::Completed);
    let failed = count(steps, StepStatus::Failed);
    let summary = if matches!(
        status,
        PlanStatus::Completed | PlanStatus::CompletedWithSkips
    ) {
        summarize(steps, assembler)
    } else {
        plan.summary.clone()
    };

    let changed = plan.status != status
        || plan.completed_steps != completed
        || plan.failed_steps != failed
        || plan.summary != summary;

    plan.status = status;
    plan.completed_steps = completed;
    plan.failed_steps = failed;
    plan.summary = summary;
    changed
}

fn count(steps: &[Step], status: StepStatus) -> u32 {
    steps.iter().filter(|s| s.status == status).count() as u32
}

/// Content of the last completed synthesis step, else of the last
/// completed step.
pub fn summarize(steps: &[Step], assembler: &ContextAssembler) -> Option<String> {
    let completed = || {
        steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
    };
    completed()
        .filter(|s| assembler.is_synthesis(&s.agent_name))
        .max_by_key(|s| s.order)
        .or_else(|| completed().max_by_key(|s| s.order))
        .and_then(Step::result_text)
}

/// Reloads a plan and persists its recomputed aggregate.
///
/// Plan writes race with approvals and other dispatch batches, so a
/// version conflict reloads and retries up to `conflict_retries` times
/// before it is returned to the caller.
pub async fn refresh_plan(
    store: &dyn PlanStore,
    assembler: &ContextAssembler,
    session_id: &str,
    plan_id: u64,
    conflict_retries: u32,
) -> Result<Plan> {
    let mut attempt = 0;
    loop {
        let mut plan = store
            .get_plan(session_id, plan_id)
            .await?
            .ok_or(EngineError::PlanNotFound { id: plan_id })?;
        let previous = plan.status;
        let steps = std::mem::take(&mut plan.steps);

        if !apply(&mut plan, &steps, assembler) {
            plan.steps = steps;
            return Ok(plan);
        }

        match store.update_plan(&plan).await {
            Ok(mut saved) => {
                if saved.status != previous {
                    info!("Plan {plan_id} status {previous} -> {}", saved.status);
                }
                saved.steps = steps;
                return Ok(saved);
            }
            Err(EngineError::PersistenceConflict { .. }) if attempt < conflict_retries => {
                attempt += 1;
                debug!("Plan {plan_id} changed concurrently; recomputing (retry {attempt})");
            }
            Err(e) => return Err(e),
        }
    }
}
