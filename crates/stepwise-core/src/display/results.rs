//! Wrappers for displaying the outcome of mutating operations.

use std::fmt;

use crate::{
    models::{Plan, Step, StepStatus},
    store::SessionDeletion,
};

/// Creation message followed by the created resource.
///
/// # Examples
///
/// ```rust
/// use jiff::Timestamp;
/// use stepwise_core::{display::CreateResult, models::{Plan, PlanStatus}};
///
/// let plan = Plan {
///     id: 1,
///     session_id: "s1".to_string(),
///     user_id: "u1".to_string(),
///     objective: "Analyze AAPL".to_string(),
///     status: PlanStatus::PendingApproval,
///     fail_fast: false,
///     cancel_requested: false,
///     file_refs: vec![],
///     halt_reason: None,
///     summary: None,
///     completed_steps: 0,
///     failed_steps: 0,
///     version: 0,
///     created_at: Timestamp::now(),
///     updated_at: Timestamp::now(),
///     steps: vec![],
/// };
///
/// let output = CreateResult::new(plan).to_string();
/// assert!(output.contains("Created plan with ID: 1"));
/// ```
pub struct CreateResult<T> {
    pub resource: T,
}

impl<T> CreateResult<T> {
    pub fn new(resource: T) -> Self {
        Self { resource }
    }
}

impl fmt::Display for CreateResult<Plan> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Created plan with ID: {}", self.resource.id)?;
        writeln!(f)?;
        write!(f, "{}", self.resource)
    }
}

/// Result of an approve or reject decision.
pub struct ApprovalResult {
    pub step: Step,
}

impl ApprovalResult {
    pub fn new(step: Step) -> Self {
        Self { step }
    }
}

impl fmt::Display for ApprovalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.step.status {
            StepStatus::Approved => "Approved",
            StepStatus::Rejected => "Rejected",
            _ => "Updated",
        };
        writeln!(f, "{verb} step with ID: {}", self.step.id)?;
        writeln!(f)?;
        write!(f, "{}", self.step)
    }
}

/// Confirmation of a session deletion.
pub struct DeletionResult<'a> {
    pub session_id: &'a str,
    pub deletion: SessionDeletion,
}

impl fmt::Display for DeletionResult<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Deleted session '{}': {}", self.session_id, self.deletion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::step;

    #[test]
    fn test_approval_result_verb() {
        let approved = ApprovalResult::new(step(3, 0, "company", &[], StepStatus::Approved));
        assert!(approved.to_string().starts_with("Approved step with ID: 3"));

        let rejected = ApprovalResult::new(step(4, 1, "company", &[], StepStatus::Rejected));
        assert!(rejected.to_string().starts_with("Rejected step with ID: 4"));
    }

    #[test]
    fn test_deletion_result() {
        let result = DeletionResult {
            session_id: "s1",
            deletion: SessionDeletion {
                plans: 1,
                steps: 3,
                messages: 5,
            },
        };
        assert_eq!(
            result.to_string(),
            "Deleted session 's1': 1 plan(s), 3 step(s), 5 message(s)\n"
        );
    }
}
