//! Step reads, versioned writes and the at-most-once claim.

use jiff::Timestamp;
use rusqlite::{params, OptionalExtension, Transaction, TransactionBehavior};

use super::{json_column, optional_timestamp_column, parsed_column, timestamp_column};
use crate::{
    error::{DatabaseResultExt, EngineError, Result},
    graph::DependencyGraph,
    models::{Step, StepStatus},
};

const STEP_COLUMNS: &str = "id, plan_id, session_id, step_order, description, agent_name, dependencies, status, result, error, feedback, attempts, version, created_at, updated_at, started_at, finished_at";
const UPDATE_STEP_SQL: &str = "UPDATE steps SET status = ?1, result = ?2, error = ?3, feedback = ?4, attempts = ?5, started_at = ?6, finished_at = ?7, updated_at = ?8, version = version + 1 WHERE id = ?9 AND session_id = ?10 AND version = ?11";
const CLAIM_STEP_SQL: &str = "UPDATE steps SET status = ?1, started_at = ?2, updated_at = ?2, version = version + 1 WHERE id = ?3 AND status = ?4";
const CHECK_STEP_EXISTS_SQL: &str =
    "SELECT EXISTS(SELECT 1 FROM steps WHERE id = ?1 AND session_id = ?2)";
const SELECT_CANCEL_REQUESTED_SQL: &str = "SELECT cancel_requested FROM plans WHERE id = ?1";

impl super::Database {
    /// Helper function to construct a Step from a database row
    fn build_step_from_row(row: &rusqlite::Row) -> rusqlite::Result<Step> {
        let result: Option<String> = row.get(8)?;
        let result = result
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
            })?;

        Ok(Step {
            id: row.get::<_, i64>(0)? as u64,
            plan_id: row.get::<_, i64>(1)? as u64,
            session_id: row.get(2)?,
            order: row.get::<_, i64>(3)? as u32,
            description: row.get(4)?,
            agent_name: row.get(5)?,
            dependencies: json_column(row, 6)?,
            status: parsed_column::<StepStatus>(row, 7)?,
            result,
            error: row.get(9)?,
            feedback: row.get(10)?,
            attempts: row.get::<_, i64>(11)? as u32,
            version: row.get::<_, i64>(12)? as u64,
            created_at: timestamp_column(row, 13)?,
            updated_at: timestamp_column(row, 14)?,
            started_at: optional_timestamp_column(row, 15)?,
            finished_at: optional_timestamp_column(row, 16)?,
        })
    }

    /// Retrieves a step by id within the session.
    pub fn get_step(&self, session_id: &str, step_id: u64) -> Result<Option<Step>> {
        let sql = format!("SELECT {STEP_COLUMNS} FROM steps WHERE id = ?1 AND session_id = ?2");
        self.connection
            .query_row(
                &sql,
                params![step_id as i64, session_id],
                Self::build_step_from_row,
            )
            .optional()
            .db_context("Failed to query step")
    }

    /// All steps of a plan, ordered by `order`.
    pub fn get_steps_by_plan(&self, plan_id: u64, session_id: &str) -> Result<Vec<Step>> {
        Self::load_plan_steps(&self.connection, plan_id, session_id)
    }

    fn load_plan_steps(
        conn: &rusqlite::Connection,
        plan_id: u64,
        session_id: &str,
    ) -> Result<Vec<Step>> {
        let sql = format!(
            "SELECT {STEP_COLUMNS} FROM steps WHERE plan_id = ?1 AND session_id = ?2 ORDER BY step_order"
        );
        let mut stmt = conn.prepare(&sql).db_context("Failed to prepare query")?;
        let steps = stmt
            .query_map(
                params![plan_id as i64, session_id],
                Self::build_step_from_row,
            )
            .db_context("Failed to query steps")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .db_context("Failed to parse step data")?;
        Ok(steps)
    }

    /// Writes a step if `step.version` is still current.
    ///
    /// Returns the step with its new version.
    pub fn save_step(&mut self, step: &Step) -> Result<Step> {
        let tx = self
            .connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .db_context("Failed to begin transaction")?;
        let saved = Self::write_step(&tx, step)?;
        tx.commit().db_context("Failed to commit transaction")?;
        Ok(saved)
    }

    /// Writes several steps atomically; any stale version aborts all of them.
    pub fn save_steps(&mut self, steps: &[Step]) -> Result<Vec<Step>> {
        let tx = self
            .connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .db_context("Failed to begin transaction")?;
        let saved = steps
            .iter()
            .map(|step| Self::write_step(&tx, step))
            .collect::<Result<Vec<_>>>()?;
        tx.commit().db_context("Failed to commit transaction")?;
        Ok(saved)
    }

    fn write_step(tx: &Transaction<'_>, step: &Step) -> Result<Step> {
        let now = Timestamp::now();
        let result = step.result.as_ref().map(serde_json::to_string).transpose()?;
        let updated = tx
            .execute(
                UPDATE_STEP_SQL,
                params![
                    step.status.as_str(),
                    result.as_deref(),
                    step.error.as_deref(),
                    step.feedback.as_deref(),
                    i64::from(step.attempts),
                    step.started_at.map(|t| t.to_string()),
                    step.finished_at.map(|t| t.to_string()),
                    now.to_string(),
                    step.id as i64,
                    &step.session_id,
                    step.version as i64
                ],
            )
            .db_context("Failed to update step")?;

        if updated == 0 {
            let exists: bool = tx
                .query_row(
                    CHECK_STEP_EXISTS_SQL,
                    params![step.id as i64, &step.session_id],
                    |row| row.get(0),
                )
                .db_context("Failed to check step existence")?;
            return Err(if exists {
                EngineError::PersistenceConflict {
                    entity: "step",
                    id: step.id,
                    expected: step.version,
                }
            } else {
                EngineError::StepNotFound { id: step.id }
            });
        }

        let mut saved = step.clone();
        saved.version = step.version + 1;
        saved.updated_at = now;
        Ok(saved)
    }

    /// Atomically moves an APPROVED step whose dependencies have all
    /// completed to EXECUTING.
    ///
    /// Returns `None` when the step is missing, not APPROVED, still waiting
    /// on a dependency, or its plan has been cancelled. Of any number of
    /// concurrent callers at most one receives the step.
    pub fn claim_step(&mut self, session_id: &str, step_id: u64) -> Result<Option<Step>> {
        let tx = self
            .connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .db_context("Failed to begin transaction")?;

        let sql = format!("SELECT {STEP_COLUMNS} FROM steps WHERE id = ?1 AND session_id = ?2");
        let step = tx
            .query_row(
                &sql,
                params![step_id as i64, session_id],
                Self::build_step_from_row,
            )
            .optional()
            .db_context("Failed to query step")?;

        let Some(step) = step else {
            return Ok(None);
        };
        if step.status != StepStatus::Approved {
            return Ok(None);
        }

        let cancelled: bool = tx
            .query_row(
                SELECT_CANCEL_REQUESTED_SQL,
                params![step.plan_id as i64],
                |row| row.get(0),
            )
            .db_context("Failed to query plan cancellation")?;
        if cancelled {
            return Ok(None);
        }

        let siblings = Self::load_plan_steps(&tx, step.plan_id, session_id)?;
        if !DependencyGraph::new(&siblings).dependencies_completed(&step) {
            return Ok(None);
        }

        let now = Timestamp::now();
        let claimed = tx
            .execute(
                CLAIM_STEP_SQL,
                params![
                    StepStatus::Executing.as_str(),
                    now.to_string(),
                    step_id as i64,
                    StepStatus::Approved.as_str()
                ],
            )
            .db_context("Failed to claim step")?;
        if claimed == 0 {
            return Ok(None);
        }

        tx.commit().db_context("Failed to commit transaction")?;

        Ok(Some(Step {
            status: StepStatus::Executing,
            started_at: Some(now),
            updated_at: now,
            version: step.version + 1,
            ..step
        }))
    }
}
