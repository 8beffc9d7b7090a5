//! Display implementations for domain models.
//!
//! Kept apart from the model definitions so the models stay plain data.
//! Output is markdown with status icons and structured sections.

use std::fmt;

use super::datetime::LocalDateTime;
use crate::{
    models::{
        ExecutionOutcome, Message, MessageRole, Plan, PlanStatus, StatusSnapshot, StatusUpdate,
        Step, StepProgress, StepStatus,
    },
    store::SessionDeletion,
};

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# {}. {}", self.id, self.objective)?;
        writeln!(f)?;

        writeln!(f, "- Status: {}", self.status)?;
        writeln!(f, "- Session: {}", self.session_id)?;
        writeln!(
            f,
            "- Progress: {}/{} completed, {} failed",
            self.completed_steps,
            self.total_steps(),
            self.failed_steps
        )?;
        if self.fail_fast {
            writeln!(f, "- Fail fast: yes")?;
        }
        if self.cancel_requested {
            writeln!(f, "- Cancellation requested")?;
        }
        if !self.file_refs.is_empty() {
            writeln!(f, "- Files: {}", self.file_refs.join(", "))?;
        }
        writeln!(f, "- Created: {}", LocalDateTime(&self.created_at))?;
        writeln!(f, "- Updated: {}", LocalDateTime(&self.updated_at))?;

        if let Some(reason) = &self.halt_reason {
            writeln!(f)?;
            writeln!(f, "**Halted:** {reason}")?;
        }

        if self.steps.is_empty() {
            writeln!(f, "\nNo steps in this plan.")?;
        } else {
            writeln!(f, "\n## Steps")?;
            writeln!(f)?;
            for step in &self.steps {
                write!(f, "{step}")?;
            }
        }

        if let Some(summary) = &self.summary {
            writeln!(f, "## Summary")?;
            writeln!(f)?;
            writeln!(f, "{summary}")?;
        }

        Ok(())
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "### {}. {} ({})",
            self.id,
            self.description,
            self.status.with_icon()
        )?;
        writeln!(f)?;
        writeln!(f, "- Agent: {}", self.agent_name)?;
        if !self.dependencies.is_empty() {
            let deps: Vec<String> = self.dependencies.iter().map(u64::to_string).collect();
            writeln!(f, "- Depends on: {}", deps.join(", "))?;
        }
        if self.attempts > 0 {
            writeln!(f, "- Attempts: {}", self.attempts)?;
        }
        if let Some(feedback) = &self.feedback {
            writeln!(f, "- Feedback: {feedback}")?;
        }
        writeln!(f)?;

        if self.status == StepStatus::Completed {
            if let Some(result) = self.result_text() {
                writeln!(f, "#### Result")?;
                writeln!(f)?;
                writeln!(f, "{result}")?;
                writeln!(f)?;
            }
        }

        if let Some(error) = &self.error {
            writeln!(f, "**Error:** {error}")?;
            writeln!(f)?;
        }

        Ok(())
    }
}

impl fmt::Display for StepProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}. {} [{}] ({})",
            self.id,
            self.description,
            self.agent_name,
            self.status.with_icon()
        )
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = self
            .step_id
            .map(|id| format!(" step {id}"))
            .unwrap_or_default();
        writeln!(
            f,
            "**{}** ({}{step}, {}):",
            self.agent_name,
            self.role,
            LocalDateTime(&self.created_at)
        )?;
        writeln!(f, "{}", self.content)
    }
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Plan {}: {}", self.plan_id, self.objective)?;
        writeln!(f)?;
        writeln!(f, "- Status: {}", self.status)?;
        writeln!(
            f,
            "- Progress: {}/{} ({:.1}%)",
            self.completed_steps, self.total_steps, self.progress_percentage
        )?;
        if self.cancel_requested {
            writeln!(f, "- Cancellation requested")?;
        }

        if !self.current_steps.is_empty() {
            writeln!(f, "\n## Current")?;
            writeln!(f)?;
            for step in &self.current_steps {
                writeln!(f, "- {step}")?;
            }
        }

        if !self.awaiting_approval.is_empty() {
            writeln!(f, "\n## Awaiting approval")?;
            writeln!(f)?;
            for step in &self.awaiting_approval {
                writeln!(f, "- {step}")?;
            }
        }

        if let Some(summary) = &self.summary {
            writeln!(f, "\n## Summary")?;
            writeln!(f)?;
            writeln!(f, "{summary}")?;
        }

        if !self.recent_messages.is_empty() {
            writeln!(f, "\n## Recent messages")?;
            writeln!(f)?;
            for message in &self.recent_messages {
                write!(f, "{message}")?;
                writeln!(f)?;
            }
        }

        Ok(())
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Plan {} is {}", self.plan_id, self.status)?;
        if self.cancelled {
            writeln!(f, "Execution stopped: cancellation requested")?;
        }
        if !self.executed.is_empty() {
            let ids: Vec<String> = self.executed.iter().map(u64::to_string).collect();
            writeln!(f, "Executed steps: {}", ids.join(", "))?;
        }
        if !self.awaiting_approval.is_empty() {
            let ids: Vec<String> = self.awaiting_approval.iter().map(u64::to_string).collect();
            writeln!(f, "Awaiting approval: {}", ids.join(", "))?;
        }
        Ok(())
    }
}

impl fmt::Display for StatusUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusUpdate::StepStarted {
                step_id,
                agent_name,
                ..
            } => write!(f, "➤ step {step_id} started ({agent_name})"),
            StatusUpdate::StepRetrying {
                step_id,
                attempt,
                delay_ms,
                error,
            } => write!(
                f,
                "↻ step {step_id} attempt {attempt} failed, retrying in {delay_ms} ms: {error}"
            ),
            StatusUpdate::StepCompleted { step_id, .. } => write!(f, "✓ step {step_id} completed"),
            StatusUpdate::StepFailed { step_id, error, .. } => {
                write!(f, "✗ step {step_id} failed: {error}")
            }
            StatusUpdate::StepsBlocked { step_ids } => {
                let ids: Vec<String> = step_ids.iter().map(u64::to_string).collect();
                write!(f, "⊘ blocked steps {}", ids.join(", "))
            }
            StatusUpdate::PlanStatusChanged { plan_id, status } => {
                write!(f, "plan {plan_id} is now {status}")
            }
            StatusUpdate::Finished(outcome) => {
                write!(f, "finished: plan {} is {}", outcome.plan_id, outcome.status)
            }
        }
    }
}

impl fmt::Display for SessionDeletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} plan(s), {} step(s), {} message(s)",
            self.plans, self.steps, self.messages
        )
    }
}
