//! Append-only audit log entries.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::MessageRole;

/// One entry in a session's audit log. Never mutated once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: u64,
    pub session_id: String,
    pub plan_id: u64,
    /// Absent for plan-level system messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<u64>,
    pub agent_name: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: Timestamp,
}

/// A message about to be appended.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub session_id: String,
    pub plan_id: u64,
    pub step_id: Option<u64>,
    pub agent_name: String,
    pub role: MessageRole,
    pub content: String,
}

impl NewMessage {
    /// Agent reply (or failure text) for a step.
    pub fn assistant(
        session_id: impl Into<String>,
        plan_id: u64,
        step_id: u64,
        agent_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            plan_id,
            step_id: Some(step_id),
            agent_name: agent_name.into(),
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Plan-level event.
    pub fn system(session_id: impl Into<String>, plan_id: u64, content: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            plan_id,
            step_id: None,
            agent_name: "dispatcher".to_string(),
            role: MessageRole::System,
            content: content.into(),
        }
    }
}
