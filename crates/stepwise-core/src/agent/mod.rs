//! The agent interface consumed by the engine.
//!
//! Agents are opaque collaborators: the engine hands them a task string and a
//! JSON context, and records whatever they return. Their output is treated
//! as possibly nondeterministic.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod registry;

pub use registry::{AgentDescriptor, AgentRegistry};

/// Reply returned by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReply {
    /// Opaque result payload stored on the step
    pub content: Value,
    /// Free-form metadata (model, token usage, ...)
    #[serde(default)]
    pub metadata: Value,
}

impl AgentReply {
    /// Reply with textual content and no metadata.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Value::String(content.into()),
            metadata: Value::Null,
        }
    }

    /// Raw reply as recorded in the message log.
    pub fn raw(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Agent failure, classified for the retry policy.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AgentError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("{0}")]
    Permanent(String),
}

impl AgentError {
    /// Transient failures are retried with backoff; everything else fails
    /// the step immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AgentError::Timeout(_) | AgentError::RateLimited { .. } | AgentError::Transient(_)
        )
    }

    /// Delay requested by the agent, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AgentError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// A specialist that can execute steps.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Registry key; steps refer to the agent by this name.
    fn name(&self) -> &str;

    /// Capability strings used for catalog registration and capability
    /// lookup by the plan builder.
    fn capabilities(&self) -> Vec<String>;

    /// Execute `task` with the assembled `context`.
    async fn run(&self, task: &str, context: &Value) -> Result<AgentReply, AgentError>;
}
