//! Step model definition and related functionality.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::StepStatus;

/// An atomic unit of work assigned to exactly one agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    /// Unique identifier for the step
    pub id: u64,

    /// ID of the parent plan
    pub plan_id: u64,

    /// Session partition, copied from the plan
    pub session_id: String,

    /// Order of the step within the plan (0-indexed, strictly increasing)
    pub order: u32,

    /// Task handed to the agent
    pub description: String,

    /// Registered agent that executes the step
    pub agent_name: String,

    /// Ids of earlier steps whose results this step consumes
    #[serde(default)]
    pub dependencies: Vec<u64>,

    /// Current status of the step
    pub status: StepStatus,

    /// Opaque agent result (set on COMPLETED)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Failure description (set on FAILED, BLOCKED, SKIPPED)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Note left by the approver or rejecter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,

    /// Agent invocations made so far
    #[serde(default)]
    pub attempts: u32,

    /// Optimistic-concurrency version
    #[serde(default)]
    pub version: u64,

    /// Timestamp when the step was created (UTC)
    pub created_at: Timestamp,

    /// Timestamp when the step was last updated (UTC)
    pub updated_at: Timestamp,

    /// When the step entered EXECUTING
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,

    /// When the step reached a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<Timestamp>,
}

impl Step {
    /// Whether the step declares `other` as a dependency.
    pub fn depends_on(&self, other: u64) -> bool {
        self.dependencies.contains(&other)
    }

    /// Renders the result as text: strings verbatim, anything else as JSON.
    pub fn result_text(&self) -> Option<String> {
        self.result.as_ref().map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}
