//! Status enumerations for plans, steps and messages.
//!
//! The string forms are part of the external contract: every transport must
//! carry them verbatim, so serde and the database both use
//! `SCREAMING_SNAKE_CASE`.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Type-safe enumeration of plan statuses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    /// No step has been approved yet
    #[default]
    PendingApproval,

    /// At least one step has left the PENDING state
    InProgress,

    /// Every step completed
    Completed,

    /// Every step is terminal but some were rejected, skipped or blocked
    CompletedWithSkips,

    /// The plan failed (fail-fast, terminal step failure or halted dispatch)
    Failed,
}

impl FromStr for PlanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING_APPROVAL" => Ok(PlanStatus::PendingApproval),
            "IN_PROGRESS" => Ok(PlanStatus::InProgress),
            "COMPLETED" => Ok(PlanStatus::Completed),
            "COMPLETED_WITH_SKIPS" => Ok(PlanStatus::CompletedWithSkips),
            "FAILED" => Ok(PlanStatus::Failed),
            _ => Err(format!("Invalid plan status: {s}")),
        }
    }
}

impl PlanStatus {
    /// Wire and database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::PendingApproval => "PENDING_APPROVAL",
            PlanStatus::InProgress => "IN_PROGRESS",
            PlanStatus::Completed => "COMPLETED",
            PlanStatus::CompletedWithSkips => "COMPLETED_WITH_SKIPS",
            PlanStatus::Failed => "FAILED",
        }
    }

    /// Terminal plans accept no further approvals or dispatch.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlanStatus::Completed | PlanStatus::CompletedWithSkips | PlanStatus::Failed
        )
    }
}

/// Type-safe enumeration of step statuses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    /// Waiting for a human decision
    Pending,

    /// Approved; runs once every dependency has completed
    Approved,

    /// Rejected by a human
    Rejected,

    /// An upstream step was rejected
    Skipped,

    /// Claimed by a dispatcher, agent call in flight
    Executing,

    /// Agent returned a result
    Completed,

    /// Agent failed permanently or exhausted its retries
    Failed,

    /// An upstream step failed
    Blocked,
}

impl FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(StepStatus::Pending),
            "APPROVED" => Ok(StepStatus::Approved),
            "REJECTED" => Ok(StepStatus::Rejected),
            "SKIPPED" => Ok(StepStatus::Skipped),
            "EXECUTING" => Ok(StepStatus::Executing),
            "COMPLETED" => Ok(StepStatus::Completed),
            "FAILED" => Ok(StepStatus::Failed),
            "BLOCKED" => Ok(StepStatus::Blocked),
            _ => Err(format!("Invalid step status: {s}")),
        }
    }
}

impl StepStatus {
    /// Wire and database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "PENDING",
            StepStatus::Approved => "APPROVED",
            StepStatus::Rejected => "REJECTED",
            StepStatus::Skipped => "SKIPPED",
            StepStatus::Executing => "EXECUTING",
            StepStatus::Completed => "COMPLETED",
            StepStatus::Failed => "FAILED",
            StepStatus::Blocked => "BLOCKED",
        }
    }

    /// Terminal steps never change status again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Rejected
                | StepStatus::Skipped
                | StepStatus::Completed
                | StepStatus::Failed
                | StepStatus::Blocked
        )
    }

    /// Get status with consistent icon formatting for display.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use stepwise_core::models::StepStatus;
    ///
    /// assert_eq!(StepStatus::Completed.with_icon(), "✓ COMPLETED");
    /// assert_eq!(StepStatus::Executing.with_icon(), "➤ EXECUTING");
    /// assert_eq!(StepStatus::Pending.with_icon(), "○ PENDING");
    /// ```
    pub fn with_icon(&self) -> &'static str {
        match self {
            StepStatus::Pending => "○ PENDING",
            StepStatus::Approved => "◉ APPROVED",
            StepStatus::Rejected => "✗ REJECTED",
            StepStatus::Skipped => "↷ SKIPPED",
            StepStatus::Executing => "➤ EXECUTING",
            StepStatus::Completed => "✓ COMPLETED",
            StepStatus::Failed => "✗ FAILED",
            StepStatus::Blocked => "⊘ BLOCKED",
        }
    }
}

/// Author of an audit-log message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Raw reply (or failure) of an agent invocation
    Assistant,

    /// Plan-level event recorded by the dispatcher
    System,
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "assistant" => Ok(MessageRole::Assistant),
            "system" => Ok(MessageRole::System),
            _ => Err(format!("Invalid message role: {s}")),
        }
    }
}

impl MessageRole {
    /// Database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}
