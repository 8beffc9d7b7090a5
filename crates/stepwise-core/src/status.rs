//! Read-side progress projection.

use std::sync::Arc;

use crate::{
    error::{EngineError, Result},
    graph::DependencyGraph,
    models::{Message, Plan, StatusSnapshot, StepProgress, StepStatus},
    store::PlanStore,
};

/// Builds [`StatusSnapshot`]s straight from the store. Holds no state of
/// its own, so every call reflects the latest persisted data.
#[derive(Clone)]
pub struct StatusReporter {
    store: Arc<dyn PlanStore>,
    message_window: usize,
}

impl StatusReporter {
    pub fn new(store: Arc<dyn PlanStore>, message_window: usize) -> Self {
        Self {
            store,
            message_window,
        }
    }

    pub async fn snapshot(&self, session_id: &str, plan_id: u64) -> Result<StatusSnapshot> {
        let plan = self
            .store
            .get_plan(session_id, plan_id)
            .await?
            .ok_or(EngineError::PlanNotFound { id: plan_id })?;
        let recent_messages = self
            .store
            .recent_messages(session_id, plan_id, self.message_window)
            .await?;
        Ok(project(&plan, recent_messages))
    }
}

/// Counts, percentage and current steps of `plan`.
///
/// Current steps are the EXECUTING ones; when nothing executes they are the
/// APPROVED steps ready to run, else the steps waiting on approval.
pub fn project(plan: &Plan, recent_messages: Vec<Message>) -> StatusSnapshot {
    let graph = DependencyGraph::new(&plan.steps);
    let total_steps = plan.total_steps();
    let completed_steps = plan
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Completed)
        .count() as u32;
    let progress_percentage = if total_steps == 0 {
        0.0
    } else {
        (f64::from(completed_steps) * 1000.0 / f64::from(total_steps)).round() / 10.0
    };

    let awaiting_approval: Vec<StepProgress> = graph
        .awaiting_approval()
        .into_iter()
        .map(StepProgress::from)
        .collect();
    let executing: Vec<StepProgress> = graph
        .steps()
        .iter()
        .filter(|s| s.status == StepStatus::Executing)
        .map(|s| StepProgress::from(*s))
        .collect();
    let current_steps = if !executing.is_empty() {
        executing
    } else {
        let ready: Vec<StepProgress> = graph
            .ready_steps()
            .into_iter()
            .map(StepProgress::from)
            .collect();
        if ready.is_empty() {
            awaiting_approval.clone()
        } else {
            ready
        }
    };

    StatusSnapshot {
        plan_id: plan.id,
        objective: plan.objective.clone(),
        status: plan.status,
        completed_steps,
        total_steps,
        progress_percentage,
        current_steps,
        awaiting_approval,
        cancel_requested: plan.cancel_requested,
        summary: plan.summary.clone(),
        recent_messages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{plan_with, step};

    #[test]
    fn test_progress_and_current_steps() {
        use StepStatus::*;
        let plan = plan_with(vec![
            step(1, 0, "company", &[], Completed),
            step(2, 1, "fundamentals", &[1], Executing),
            step(3, 2, "summarizer", &[2], Pending),
        ]);
        let snapshot = project(&plan, Vec::new());
        assert_eq!(snapshot.completed_steps, 1);
        assert_eq!(snapshot.total_steps, 3);
        assert!((snapshot.progress_percentage - 33.3).abs() < f64::EPSILON);
        let current: Vec<u64> = snapshot.current_steps.iter().map(|s| s.id).collect();
        assert_eq!(current, vec![2]);
        assert!(snapshot.awaiting_approval.is_empty());
    }

    #[test]
    fn test_current_steps_fall_back_to_awaiting_approval() {
        use StepStatus::*;
        let plan = plan_with(vec![
            step(1, 0, "company", &[], Completed),
            step(2, 1, "fundamentals", &[1], Pending),
        ]);
        let snapshot = project(&plan, Vec::new());
        assert_eq!(snapshot.current_steps.len(), 1);
        assert_eq!(snapshot.current_steps[0].id, 2);
        assert_eq!(snapshot.awaiting_approval[0].status, Pending);
        assert!((snapshot.progress_percentage - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_plan_has_zero_progress() {
        let snapshot = project(&plan_with(Vec::new()), Vec::new());
        assert_eq!(snapshot.progress_percentage, 0.0);
        assert!(snapshot.current_steps.is_empty());
    }
}
