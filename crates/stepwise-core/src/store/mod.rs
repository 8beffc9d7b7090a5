//! Persistence interface for plans, steps and messages.
//!
//! Every read and write is scoped by `session_id`; entities of another
//! session are reported as not found. Plans and steps carry a `version`
//! that writers must present: a stale version fails with
//! `EngineError::PersistenceConflict` and nothing is written.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    models::{Message, NewMessage, NewPlan, Plan, Step},
};

pub mod sqlite;

pub use sqlite::SqlitePlanStore;

/// Rows removed by [`PlanStore::delete_session`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDeletion {
    pub plans: u64,
    pub steps: u64,
    pub messages: u64,
}

#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Creates a plan and its steps atomically.
    ///
    /// Fails with `DependencyCycle` (writing nothing) when a step depends
    /// on itself or a later step.
    async fn save_plan(&self, plan: &NewPlan) -> Result<Plan>;

    /// Writes status, summary, counters and the cancel flag of a plan.
    async fn update_plan(&self, plan: &Plan) -> Result<Plan>;

    /// Loads a plan and its steps eagerly.
    async fn get_plan(&self, session_id: &str, plan_id: u64) -> Result<Option<Plan>>;

    /// Writes one step under optimistic concurrency.
    async fn save_step(&self, step: &Step) -> Result<Step>;

    /// Writes several steps in one transaction; a single stale version
    /// aborts the whole batch.
    async fn save_steps(&self, steps: &[Step]) -> Result<Vec<Step>>;

    /// Moves an APPROVED, dependency-complete step to EXECUTING.
    ///
    /// At most one of any number of concurrent callers receives `Some`.
    async fn claim_step(&self, session_id: &str, step_id: u64) -> Result<Option<Step>>;

    async fn get_step(&self, session_id: &str, step_id: u64) -> Result<Option<Step>>;

    async fn get_steps_by_plan(&self, plan_id: u64, session_id: &str) -> Result<Vec<Step>>;

    async fn append_message(&self, message: &NewMessage) -> Result<Message>;

    /// All messages of a session, or of one of its plans, in append order.
    async fn get_messages(&self, session_id: &str, plan_id: Option<u64>) -> Result<Vec<Message>>;

    /// The `limit` most recent messages of a plan, oldest first.
    async fn recent_messages(
        &self,
        session_id: &str,
        plan_id: u64,
        limit: usize,
    ) -> Result<Vec<Message>>;

    /// Sets the plan's cancel flag.
    async fn request_cancel(&self, session_id: &str, plan_id: u64) -> Result<()>;

    /// Removes all plans, steps and messages of a session.
    async fn delete_session(&self, session_id: &str) -> Result<SessionDeletion>;

    /// Takes or renews the dispatch lease on a plan. Returns `false` when
    /// another owner holds an unexpired lease.
    async fn acquire_lease(&self, plan_id: u64, owner: &str, ttl: Duration) -> Result<bool>;

    async fn release_lease(&self, plan_id: u64, owner: &str) -> Result<()>;
}
