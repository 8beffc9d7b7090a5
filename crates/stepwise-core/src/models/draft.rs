//! Validated-but-unpersisted plans.

use serde::{Deserialize, Serialize};

/// A step before it has been given an id. Dependencies reference earlier
/// steps by their order (index in the draft).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftStep {
    pub description: String,
    pub agent_name: String,
    #[serde(default)]
    pub depends_on: Vec<u32>,
}

impl DraftStep {
    pub fn new(description: impl Into<String>, agent_name: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            agent_name: agent_name.into(),
            depends_on: Vec::new(),
        }
    }

    /// Adds dependencies on earlier steps (by order).
    pub fn after(mut self, orders: impl IntoIterator<Item = u32>) -> Self {
        self.depends_on.extend(orders);
        self
    }
}

/// Everything the store needs to create a plan and its steps atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPlan {
    pub session_id: String,
    pub user_id: String,
    pub objective: String,
    pub file_refs: Vec<String>,
    pub fail_fast: bool,
    pub steps: Vec<DraftStep>,
}
