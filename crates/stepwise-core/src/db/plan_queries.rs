//! Plan CRUD operations and session cleanup.

use jiff::Timestamp;
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use super::{json_column, parsed_column, timestamp_column};
use crate::{
    error::{DatabaseResultExt, EngineError, Result},
    graph::validate_dependencies,
    models::{NewPlan, Plan, PlanStatus, Step, StepStatus},
    store::SessionDeletion,
};

const PLAN_COLUMNS: &str = "id, session_id, user_id, objective, status, fail_fast, cancel_requested, file_refs, halt_reason, summary, completed_steps, failed_steps, version, created_at, updated_at";
const INSERT_PLAN_SQL: &str = "INSERT INTO plans (session_id, user_id, objective, status, fail_fast, file_refs, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";
const INSERT_STEP_SQL: &str = "INSERT INTO steps (plan_id, session_id, step_order, description, agent_name, dependencies, status, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";
const UPDATE_PLAN_SQL: &str = "UPDATE plans SET status = ?1, summary = ?2, completed_steps = ?3, failed_steps = ?4, cancel_requested = ?5, halt_reason = ?6, updated_at = ?7, version = version + 1 WHERE id = ?8 AND session_id = ?9 AND version = ?10";
const CHECK_PLAN_EXISTS_SQL: &str =
    "SELECT EXISTS(SELECT 1 FROM plans WHERE id = ?1 AND session_id = ?2)";
const REQUEST_CANCEL_SQL: &str = "UPDATE plans SET cancel_requested = 1, updated_at = ?1, version = version + 1 WHERE id = ?2 AND session_id = ?3";
const COUNT_SESSION_PLANS_SQL: &str = "SELECT COUNT(*) FROM plans WHERE session_id = ?1";
const COUNT_SESSION_STEPS_SQL: &str = "SELECT COUNT(*) FROM steps WHERE session_id = ?1";
const COUNT_SESSION_MESSAGES_SQL: &str = "SELECT COUNT(*) FROM messages WHERE session_id = ?1";
const DELETE_SESSION_MESSAGES_SQL: &str = "DELETE FROM messages WHERE session_id = ?1";
const DELETE_SESSION_STEPS_SQL: &str = "DELETE FROM steps WHERE session_id = ?1";
const DELETE_SESSION_PLANS_SQL: &str = "DELETE FROM plans WHERE session_id = ?1";

impl super::Database {
    fn build_plan_from_row(row: &rusqlite::Row) -> rusqlite::Result<Plan> {
        Ok(Plan {
            id: row.get::<_, i64>(0)? as u64,
            session_id: row.get(1)?,
            user_id: row.get(2)?,
            objective: row.get(3)?,
            status: parsed_column::<PlanStatus>(row, 4)?,
            fail_fast: row.get(5)?,
            cancel_requested: row.get(6)?,
            file_refs: json_column(row, 7)?,
            halt_reason: row.get(8)?,
            summary: row.get(9)?,
            completed_steps: row.get::<_, i64>(10)? as u32,
            failed_steps: row.get::<_, i64>(11)? as u32,
            version: row.get::<_, i64>(12)? as u64,
            created_at: timestamp_column(row, 13)?,
            updated_at: timestamp_column(row, 14)?,
            steps: Vec::new(),
        })
    }

    /// Creates a plan and all of its steps in one transaction.
    ///
    /// Draft dependencies (orders) are rewritten to the ids assigned on
    /// insert. Nothing is written if the dependency relation is invalid.
    pub fn insert_plan(&mut self, new_plan: &NewPlan) -> Result<Plan> {
        let dependencies: Vec<Vec<u32>> = new_plan
            .steps
            .iter()
            .map(|step| step.depends_on.clone())
            .collect();
        validate_dependencies(&dependencies)?;

        let file_refs = serde_json::to_string(&new_plan.file_refs)?;
        let now = Timestamp::now();
        let now_str = now.to_string();

        let tx = self
            .connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .db_context("Failed to begin transaction")?;

        tx.execute(
            INSERT_PLAN_SQL,
            params![
                &new_plan.session_id,
                &new_plan.user_id,
                &new_plan.objective,
                PlanStatus::PendingApproval.as_str(),
                new_plan.fail_fast,
                &file_refs,
                &now_str,
                &now_str
            ],
        )
        .db_context("Failed to insert plan")?;
        let plan_id = tx.last_insert_rowid() as u64;

        let mut steps: Vec<Step> = Vec::with_capacity(new_plan.steps.len());
        for (order, draft) in new_plan.steps.iter().enumerate() {
            // validated above: every dep is an earlier order
            let dependencies: Vec<u64> = draft
                .depends_on
                .iter()
                .map(|&dep| steps[dep as usize].id)
                .collect();
            let dependencies_json = serde_json::to_string(&dependencies)?;

            tx.execute(
                INSERT_STEP_SQL,
                params![
                    plan_id as i64,
                    &new_plan.session_id,
                    order as i64,
                    &draft.description,
                    &draft.agent_name,
                    &dependencies_json,
                    StepStatus::Pending.as_str(),
                    &now_str,
                    &now_str
                ],
            )
            .db_context("Failed to insert step")?;

            steps.push(Step {
                id: tx.last_insert_rowid() as u64,
                plan_id,
                session_id: new_plan.session_id.clone(),
                order: order as u32,
                description: draft.description.clone(),
                agent_name: draft.agent_name.clone(),
                dependencies,
                status: StepStatus::Pending,
                result: None,
                error: None,
                feedback: None,
                attempts: 0,
                version: 0,
                created_at: now,
                updated_at: now,
                started_at: None,
                finished_at: None,
            });
        }

        tx.commit().db_context("Failed to commit transaction")?;

        Ok(Plan {
            id: plan_id,
            session_id: new_plan.session_id.clone(),
            user_id: new_plan.user_id.clone(),
            objective: new_plan.objective.clone(),
            status: PlanStatus::PendingApproval,
            fail_fast: new_plan.fail_fast,
            cancel_requested: false,
            file_refs: new_plan.file_refs.clone(),
            halt_reason: None,
            summary: None,
            completed_steps: 0,
            failed_steps: 0,
            version: 0,
            created_at: now,
            updated_at: now,
            steps,
        })
    }

    /// Retrieves a plan with its steps, scoped to the session.
    pub fn get_plan(&self, session_id: &str, plan_id: u64) -> Result<Option<Plan>> {
        let sql = format!("SELECT {PLAN_COLUMNS} FROM plans WHERE id = ?1 AND session_id = ?2");
        let plan = self
            .connection
            .query_row(
                &sql,
                params![plan_id as i64, session_id],
                Self::build_plan_from_row,
            )
            .optional()
            .db_context("Failed to query plan")?;

        match plan {
            Some(mut plan) => {
                plan.steps = self.get_steps_by_plan(plan_id, session_id)?;
                Ok(Some(plan))
            }
            None => Ok(None),
        }
    }

    /// Writes the mutable plan fields if `plan.version` is still current.
    ///
    /// Returns the plan with its new version.
    pub fn update_plan(&mut self, plan: &Plan) -> Result<Plan> {
        let now = Timestamp::now();
        let updated = self
            .connection
            .execute(
                UPDATE_PLAN_SQL,
                params![
                    plan.status.as_str(),
                    plan.summary.as_deref(),
                    i64::from(plan.completed_steps),
                    i64::from(plan.failed_steps),
                    plan.cancel_requested,
                    plan.halt_reason.as_deref(),
                    now.to_string(),
                    plan.id as i64,
                    &plan.session_id,
                    plan.version as i64
                ],
            )
            .db_context("Failed to update plan")?;

        if updated == 0 {
            return Err(self.plan_write_failure(&plan.session_id, plan.id, plan.version)?);
        }

        let mut saved = plan.clone();
        saved.version = plan.version + 1;
        saved.updated_at = now;
        Ok(saved)
    }

    /// Sets the cancel flag. Dispatchers observe it between batches.
    pub fn request_cancel(&mut self, session_id: &str, plan_id: u64) -> Result<()> {
        let updated = self
            .connection
            .execute(
                REQUEST_CANCEL_SQL,
                params![Timestamp::now().to_string(), plan_id as i64, session_id],
            )
            .db_context("Failed to request cancellation")?;
        if updated == 0 {
            return Err(EngineError::PlanNotFound { id: plan_id });
        }
        Ok(())
    }

    /// Removes every plan, step and message of a session in one transaction.
    pub fn delete_session(&mut self, session_id: &str) -> Result<SessionDeletion> {
        let tx = self
            .connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .db_context("Failed to begin transaction")?;

        let count = |sql: &str| -> Result<u64> {
            tx.query_row(sql, params![session_id], |row| row.get::<_, i64>(0))
                .map(|n| n as u64)
                .db_context("Failed to count session rows")
        };
        let deletion = SessionDeletion {
            plans: count(COUNT_SESSION_PLANS_SQL)?,
            steps: count(COUNT_SESSION_STEPS_SQL)?,
            messages: count(COUNT_SESSION_MESSAGES_SQL)?,
        };

        for sql in [
            DELETE_SESSION_MESSAGES_SQL,
            DELETE_SESSION_STEPS_SQL,
            DELETE_SESSION_PLANS_SQL,
        ] {
            tx.execute(sql, params![session_id])
                .db_context("Failed to delete session data")?;
        }

        tx.commit().db_context("Failed to commit transaction")?;
        Ok(deletion)
    }

    /// Distinguishes a missing plan from a stale version after a CAS miss.
    fn plan_write_failure(&self, session_id: &str, plan_id: u64, expected: u64) -> Result<EngineError> {
        let exists: bool = self
            .connection
            .query_row(
                CHECK_PLAN_EXISTS_SQL,
                params![plan_id as i64, session_id],
                |row| row.get(0),
            )
            .db_context("Failed to check plan existence")?;
        Ok(if exists {
            EngineError::PersistenceConflict {
                entity: "plan",
                id: plan_id,
                expected,
            }
        } else {
            EngineError::PlanNotFound { id: plan_id }
        })
    }
}
