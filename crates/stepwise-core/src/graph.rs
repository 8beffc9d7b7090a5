//! Dependency resolution over a plan's steps.
//!
//! Everything here is synchronous and side-effect free: the graph answers
//! questions (which steps are ready, who depends on whom, may this step be
//! approved) and the async layers apply the answers through the store.

use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::{
    error::{EngineError, Result},
    models::{PlanStatus, Step, StepStatus},
};

/// Checks that every dependency references a strictly earlier step.
///
/// `dependencies[i]` lists the orders step `i` depends on. Requiring
/// `dep < i` makes the relation acyclic by construction, so any cycle shows
/// up as a self or forward reference.
///
/// # Errors
///
/// Returns `EngineError::DependencyCycle` naming the first offending edge.
pub fn validate_dependencies(dependencies: &[Vec<u32>]) -> Result<()> {
    for (order, deps) in dependencies.iter().enumerate() {
        let order = order as u32;
        if let Some(&dependency) = deps.iter().find(|&&dep| dep >= order) {
            return Err(EngineError::DependencyCycle {
                step: order,
                dependency,
            });
        }
    }
    Ok(())
}

/// What approving a step would do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalCheck {
    /// PENDING → APPROVED
    Approve,
    /// Already approved; nothing to write
    AlreadyApproved,
}

/// What rejecting a step would do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionCheck {
    /// → REJECTED, and these transitive dependents → SKIPPED
    Reject { skip: Vec<u64> },
    /// Already rejected; nothing to write
    AlreadyRejected,
}

/// Read-only view of a plan's dependency relation.
pub struct DependencyGraph<'a> {
    steps: Vec<&'a Step>,
    by_id: HashMap<u64, &'a Step>,
}

impl<'a> DependencyGraph<'a> {
    /// Builds the graph, ordering steps by `order`.
    pub fn new(steps: &'a [Step]) -> Self {
        let mut ordered: Vec<&Step> = steps.iter().collect();
        ordered.sort_by_key(|step| step.order);
        let by_id = steps.iter().map(|step| (step.id, step)).collect();
        Self {
            steps: ordered,
            by_id,
        }
    }

    /// Verifies persisted steps still satisfy the DAG invariant.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::CorruptState` if a dependency is missing from
    /// the plan or does not have a smaller order.
    pub fn validate(&self) -> Result<()> {
        for step in &self.steps {
            for dep in &step.dependencies {
                match self.by_id.get(dep) {
                    Some(parent) if parent.order < step.order => {}
                    Some(parent) => {
                        return Err(EngineError::corrupt(format!(
                            "step {} (order {}) depends on step {} with order {}",
                            step.id, step.order, parent.id, parent.order
                        )))
                    }
                    None => {
                        return Err(EngineError::corrupt(format!(
                            "step {} depends on step {dep}, which is not part of the plan",
                            step.id
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, step_id: u64) -> Option<&'a Step> {
        self.by_id.get(&step_id).copied()
    }

    /// Steps in order.
    pub fn steps(&self) -> &[&'a Step] {
        &self.steps
    }

    /// Whether every dependency of `step` has COMPLETED.
    pub fn dependencies_completed(&self, step: &Step) -> bool {
        step.dependencies.iter().all(|dep| {
            self.by_id
                .get(dep)
                .is_some_and(|parent| parent.status == StepStatus::Completed)
        })
    }

    /// APPROVED steps whose dependencies are all COMPLETED, in order.
    pub fn ready_steps(&self) -> Vec<&'a Step> {
        self.steps
            .iter()
            .copied()
            .filter(|step| step.status == StepStatus::Approved && self.dependencies_completed(step))
            .collect()
    }

    /// Whether a lower-order step than `step` is APPROVED or EXECUTING,
    /// i.e. will still produce a result.
    pub fn has_open_predecessor(&self, step: &Step) -> bool {
        self.steps
            .iter()
            .take_while(|other| other.order < step.order)
            .any(|other| matches!(other.status, StepStatus::Approved | StepStatus::Executing))
    }

    /// PENDING steps whose dependencies are all COMPLETED, in order.
    pub fn awaiting_approval(&self) -> Vec<&'a Step> {
        self.steps
            .iter()
            .copied()
            .filter(|step| step.status == StepStatus::Pending && self.dependencies_completed(step))
            .collect()
    }

    /// Every step that transitively depends on `step_id`, in order.
    pub fn transitive_dependents(&self, step_id: u64) -> Vec<u64> {
        let mut found = BTreeSet::new();
        let mut queue = VecDeque::from([step_id]);
        while let Some(current) = queue.pop_front() {
            for step in &self.steps {
                if step.depends_on(current) && found.insert((step.order, step.id)) {
                    queue.push_back(step.id);
                }
            }
        }
        found.into_iter().map(|(_, id)| id).collect()
    }

    /// Non-terminal transitive dependents of `step_id`; these are the steps
    /// a rejection skips or a failure blocks.
    pub fn open_dependents(&self, step_id: u64) -> Vec<u64> {
        self.transitive_dependents(step_id)
            .into_iter()
            .filter(|id| self.by_id.get(id).is_some_and(|s| !s.status.is_terminal()))
            .collect()
    }

    /// Decides whether `step_id` may be approved.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ApprovalState` if the step is not PENDING or
    /// APPROVED, or if its dependencies have not all completed.
    pub fn check_approval(&self, step_id: u64) -> Result<ApprovalCheck> {
        let step = self
            .get(step_id)
            .ok_or(EngineError::StepNotFound { id: step_id })?;
        match step.status {
            StepStatus::Approved => Ok(ApprovalCheck::AlreadyApproved),
            StepStatus::Pending => {
                let unmet: Vec<String> = step
                    .dependencies
                    .iter()
                    .filter(|dep| {
                        !self
                            .by_id
                            .get(dep)
                            .is_some_and(|parent| parent.status == StepStatus::Completed)
                    })
                    .map(u64::to_string)
                    .collect();
                if unmet.is_empty() {
                    Ok(ApprovalCheck::Approve)
                } else {
                    Err(EngineError::ApprovalState {
                        step_id,
                        action: "approved",
                        status: step.status,
                        reason: format!("dependencies not completed: {}", unmet.join(", ")),
                    })
                }
            }
            status => Err(EngineError::ApprovalState {
                step_id,
                action: "approved",
                status,
                reason: "only PENDING steps can be approved".to_string(),
            }),
        }
    }

    /// Decides whether `step_id` may be rejected and which steps the
    /// rejection skips.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ApprovalState` if the step is executing or
    /// already terminal (other than REJECTED).
    pub fn check_rejection(&self, step_id: u64) -> Result<RejectionCheck> {
        let step = self
            .get(step_id)
            .ok_or(EngineError::StepNotFound { id: step_id })?;
        match step.status {
            StepStatus::Rejected => Ok(RejectionCheck::AlreadyRejected),
            StepStatus::Pending | StepStatus::Approved => Ok(RejectionCheck::Reject {
                skip: self.open_dependents(step_id),
            }),
            status => Err(EngineError::ApprovalState {
                step_id,
                action: "rejected",
                status,
                reason: "only PENDING or APPROVED steps can be rejected".to_string(),
            }),
        }
    }
}

/// Derives a plan's status from its steps.
///
/// Priority: fail-fast failure or rejection, then a failed terminal
/// (highest-order) step, then completion, then pending, else in progress.
/// A BLOCKED terminal step leaves the plan open so independent branches
/// can still run; the plan settles once every step is terminal.
pub fn derive_plan_status(steps: &[Step], fail_fast: bool) -> PlanStatus {
    let Some(terminal) = steps.iter().max_by_key(|step| step.order) else {
        return PlanStatus::PendingApproval;
    };

    if fail_fast
        && steps
            .iter()
            .any(|s| matches!(s.status, StepStatus::Failed | StepStatus::Rejected))
    {
        return PlanStatus::Failed;
    }

    if terminal.status == StepStatus::Failed {
        return PlanStatus::Failed;
    }

    if steps.iter().all(|s| s.status.is_terminal()) {
        return if steps.iter().all(|s| s.status == StepStatus::Completed) {
            PlanStatus::Completed
        } else {
            PlanStatus::CompletedWithSkips
        };
    }

    if steps.iter().all(|s| s.status == StepStatus::Pending) {
        PlanStatus::PendingApproval
    } else {
        PlanStatus::InProgress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::step;

    fn scenario(statuses: [StepStatus; 3]) -> Vec<Step> {
        vec![
            step(1, 0, "company", &[], statuses[0]),
            step(2, 1, "fundamentals", &[1], statuses[1]),
            step(3, 2, "summarizer", &[2], statuses[2]),
        ]
    }

    #[test]
    fn test_validate_dependencies_accepts_backward_edges() {
        assert!(validate_dependencies(&[vec![], vec![0], vec![0, 1]]).is_ok());
    }

    #[test]
    fn test_validate_dependencies_rejects_self_and_forward_edges() {
        assert!(matches!(
            validate_dependencies(&[vec![], vec![1]]),
            Err(EngineError::DependencyCycle { step: 1, dependency: 1 })
        ));
        assert!(matches!(
            validate_dependencies(&[vec![1], vec![0]]),
            Err(EngineError::DependencyCycle { step: 0, dependency: 1 })
        ));
    }

    #[test]
    fn test_ready_steps_require_approval_and_completed_dependencies() {
        use StepStatus::*;
        let steps = scenario([Completed, Approved, Approved]);
        let graph = DependencyGraph::new(&steps);
        let ready: Vec<u64> = graph.ready_steps().iter().map(|s| s.id).collect();
        assert_eq!(ready, vec![2]);

        let steps = scenario([Approved, Pending, Pending]);
        let graph = DependencyGraph::new(&steps);
        assert_eq!(graph.ready_steps().len(), 1);
        assert!(graph.awaiting_approval().is_empty());
    }

    #[test]
    fn test_open_predecessor_ignores_pending_and_terminal_steps() {
        use StepStatus::*;
        let steps = scenario([Completed, Approved, Approved]);
        let graph = DependencyGraph::new(&steps);
        assert!(graph.has_open_predecessor(&steps[2]));
        assert!(!graph.has_open_predecessor(&steps[1]));

        let steps = scenario([Pending, Failed, Approved]);
        let graph = DependencyGraph::new(&steps);
        assert!(!graph.has_open_predecessor(&steps[2]));

        let steps = scenario([Executing, Completed, Approved]);
        let graph = DependencyGraph::new(&steps);
        assert!(graph.has_open_predecessor(&steps[2]));
    }

    #[test]
    fn test_transitive_dependents_in_order() {
        let steps = vec![
            step(1, 0, "a", &[], StepStatus::Pending),
            step(2, 1, "b", &[1], StepStatus::Pending),
            step(3, 2, "c", &[], StepStatus::Pending),
            step(4, 3, "d", &[2, 3], StepStatus::Pending),
        ];
        let graph = DependencyGraph::new(&steps);
        assert_eq!(graph.transitive_dependents(1), vec![2, 4]);
        assert_eq!(graph.transitive_dependents(3), vec![4]);
        assert!(graph.transitive_dependents(4).is_empty());
    }

    #[test]
    fn test_check_approval_states() {
        use StepStatus::*;
        let steps = scenario([Completed, Approved, Pending]);
        let graph = DependencyGraph::new(&steps);
        assert_eq!(graph.check_approval(2).unwrap(), ApprovalCheck::AlreadyApproved);
        assert!(matches!(
            graph.check_approval(3),
            Err(EngineError::ApprovalState { step_id: 3, .. })
        ));
        assert!(matches!(
            graph.check_approval(1),
            Err(EngineError::ApprovalState { status: Completed, .. })
        ));
        assert!(matches!(
            graph.check_approval(99),
            Err(EngineError::StepNotFound { id: 99 })
        ));
    }

    #[test]
    fn test_check_rejection_collects_open_dependents() {
        use StepStatus::*;
        let steps = scenario([Completed, Pending, Pending]);
        let graph = DependencyGraph::new(&steps);
        assert_eq!(
            graph.check_rejection(2).unwrap(),
            RejectionCheck::Reject { skip: vec![3] }
        );
        assert!(graph.check_rejection(1).is_err());

        let steps = scenario([Completed, Rejected, Skipped]);
        let graph = DependencyGraph::new(&steps);
        assert_eq!(graph.check_rejection(2).unwrap(), RejectionCheck::AlreadyRejected);
    }

    #[test]
    fn test_validate_flags_forward_reference() {
        let steps = vec![
            step(1, 0, "a", &[2], StepStatus::Pending),
            step(2, 1, "b", &[], StepStatus::Pending),
        ];
        assert!(matches!(
            DependencyGraph::new(&steps).validate(),
            Err(EngineError::CorruptState { .. })
        ));
    }

    #[test]
    fn test_derive_plan_status() {
        use StepStatus::*;
        assert_eq!(
            derive_plan_status(&scenario([Pending, Pending, Pending]), false),
            PlanStatus::PendingApproval
        );
        assert_eq!(
            derive_plan_status(&scenario([Approved, Pending, Pending]), false),
            PlanStatus::InProgress
        );
        assert_eq!(
            derive_plan_status(&scenario([Completed, Completed, Completed]), false),
            PlanStatus::Completed
        );
        assert_eq!(
            derive_plan_status(&scenario([Completed, Rejected, Skipped]), false),
            PlanStatus::CompletedWithSkips
        );
        assert_eq!(
            derive_plan_status(&scenario([Completed, Rejected, Skipped]), true),
            PlanStatus::Failed
        );
        assert_eq!(
            derive_plan_status(&scenario([Completed, Failed, Blocked]), false),
            PlanStatus::CompletedWithSkips
        );
        assert_eq!(
            derive_plan_status(&scenario([Completed, Completed, Failed]), false),
            PlanStatus::Failed
        );
        assert_eq!(derive_plan_status(&[], false), PlanStatus::PendingApproval);
    }

    #[test]
    fn test_independent_failure_does_not_fail_plan() {
        let steps = vec![
            step(1, 0, "a", &[], StepStatus::Failed),
            step(2, 1, "b", &[], StepStatus::Completed),
            step(3, 2, "c", &[2], StepStatus::Approved),
        ];
        assert_eq!(derive_plan_status(&steps, false), PlanStatus::InProgress);
        assert_eq!(derive_plan_status(&steps, true), PlanStatus::Failed);
    }

    #[test]
    fn test_blocked_terminal_step_keeps_independent_branch_open() {
        let steps = vec![
            step(1, 0, "company", &[], StepStatus::Failed),
            step(2, 1, "news", &[], StepStatus::Approved),
            step(3, 2, "summarizer", &[1], StepStatus::Blocked),
        ];
        assert_eq!(derive_plan_status(&steps, false), PlanStatus::InProgress);
        assert_eq!(derive_plan_status(&steps, true), PlanStatus::Failed);
    }
}
