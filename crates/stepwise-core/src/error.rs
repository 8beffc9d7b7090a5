//! Error types for the orchestration engine.

use std::path::PathBuf;

use thiserror::Error;

use crate::{agent::AgentError, models::StepStatus};

/// Comprehensive error type for all engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Database connection or query errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: rusqlite::Error,
    },
    /// Plan not found for the given ID within the session
    #[error("Plan with ID {id} not found")]
    PlanNotFound { id: u64 },
    /// Step not found for the given ID within the session
    #[error("Step with ID {id} not found")]
    StepNotFound { id: u64 },
    /// The planner could not produce a valid plan within the attempt budget.
    /// Nothing is persisted when this is returned.
    #[error("Plan generation failed after {attempts} attempt(s): {reason}")]
    PlanGeneration { attempts: u32, reason: String },
    /// A step declares a dependency that is not an earlier step.
    #[error("Step {step} cannot depend on step {dependency}: dependencies must reference earlier steps")]
    DependencyCycle { step: u32, dependency: u32 },
    /// Approve/reject issued against a step in the wrong state. No state
    /// change has been made.
    #[error("Step {step_id} cannot be {action} while {status}: {reason}")]
    ApprovalState {
        step_id: u64,
        action: &'static str,
        status: StepStatus,
        reason: String,
    },
    /// An agent invocation failed
    #[error("Agent '{agent}' failed on step {step_id}: {source}")]
    AgentExecution {
        step_id: u64,
        agent: String,
        #[source]
        source: AgentError,
    },
    /// Optimistic-concurrency check failed on a versioned row
    #[error("Concurrent modification of {entity} {id} (expected version {expected})")]
    PersistenceConflict {
        entity: &'static str,
        id: u64,
        expected: u64,
    },
    /// A step references an agent that is not registered
    #[error("No agent registered under the name '{name}'")]
    UnknownAgent { name: String },
    /// Persisted state violates an engine invariant
    #[error("Corrupted plan state: {message}")]
    CorruptState { message: String },
    /// Another dispatcher currently owns the plan
    #[error("Plan {plan_id} is being dispatched by another owner")]
    LeaseHeld { plan_id: u64 },
    /// File system operation errors
    #[error("File system error at path '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        source: std::io::Error,
    },
    /// XDG directory specification errors
    #[error("XDG directory error: {0}")]
    XdgDirectory(String),
    /// Invalid input validation errors
    #[error("Invalid input for field '{field}': {reason}")]
    InvalidInput { field: String, reason: String },
    /// Serialization/deserialization errors
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

/// Builder for creating database errors with optional context.
pub struct DatabaseErrorBuilder {
    message: String,
}

impl DatabaseErrorBuilder {
    /// Create a new database error builder with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Build the error with the given source.
    pub fn with_source(self, source: rusqlite::Error) -> EngineError {
        EngineError::Database {
            message: self.message,
            source,
        }
    }
}

/// Builder for creating input validation errors.
pub struct InvalidInputBuilder {
    field: String,
}

impl InvalidInputBuilder {
    /// Create a new invalid input error builder for a field.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    /// Build the error with the given reason.
    pub fn with_reason(self, reason: impl Into<String>) -> EngineError {
        EngineError::InvalidInput {
            field: self.field,
            reason: reason.into(),
        }
    }
}

impl EngineError {
    /// Creates a builder for database errors.
    pub fn database(message: impl Into<String>) -> DatabaseErrorBuilder {
        DatabaseErrorBuilder::new(message)
    }

    /// Creates a builder for input validation errors.
    pub fn invalid_input(field: impl Into<String>) -> InvalidInputBuilder {
        InvalidInputBuilder::new(field)
    }

    /// Creates a corrupted-state error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        EngineError::CorruptState {
            message: message.into(),
        }
    }

    /// Wraps a blocking task join failure.
    pub(crate) fn join(e: tokio::task::JoinError) -> Self {
        EngineError::Configuration {
            message: format!("Task join error: {e}"),
        }
    }

    /// Whether this error is a contract violation that must halt the whole
    /// plan rather than a single step.
    pub fn halts_plan(&self) -> bool {
        matches!(
            self,
            EngineError::UnknownAgent { .. }
                | EngineError::CorruptState { .. }
                | EngineError::PersistenceConflict { .. }
        )
    }
}

/// Specialized extension trait for database-related Results.
pub trait DatabaseResultExt<T> {
    /// Map database errors with a message.
    fn db_context(self, message: &str) -> Result<T>;
}

impl<T> DatabaseResultExt<T> for std::result::Result<T, rusqlite::Error> {
    fn db_context(self, message: &str) -> Result<T> {
        self.map_err(|e| EngineError::database(message).with_source(e))
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
