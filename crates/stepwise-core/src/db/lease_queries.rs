//! Single-dispatcher leases on plans.

use std::time::Duration;

use jiff::Timestamp;
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use crate::error::{DatabaseResultExt, Result};

const SELECT_LEASE_SQL: &str = "SELECT owner, expires_at FROM plan_leases WHERE plan_id = ?1";
const UPSERT_LEASE_SQL: &str = "INSERT INTO plan_leases (plan_id, owner, expires_at) VALUES (?1, ?2, ?3) ON CONFLICT(plan_id) DO UPDATE SET owner = excluded.owner, expires_at = excluded.expires_at";
const RELEASE_LEASE_SQL: &str = "DELETE FROM plan_leases WHERE plan_id = ?1 AND owner = ?2";

impl super::Database {
    /// Takes or renews the lease on a plan.
    ///
    /// Succeeds when there is no lease, the lease has expired, or `owner`
    /// already holds it.
    pub fn acquire_lease(&mut self, plan_id: u64, owner: &str, ttl: Duration) -> Result<bool> {
        let tx = self
            .connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .db_context("Failed to begin transaction")?;

        let now_ms = Timestamp::now().as_millisecond();
        let current: Option<(String, i64)> = tx
            .query_row(SELECT_LEASE_SQL, params![plan_id as i64], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()
            .db_context("Failed to query lease")?;

        if let Some((holder, expires_at)) = current {
            if holder != owner && expires_at > now_ms {
                return Ok(false);
            }
        }

        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        tx.execute(
            UPSERT_LEASE_SQL,
            params![plan_id as i64, owner, now_ms.saturating_add(ttl_ms)],
        )
        .db_context("Failed to write lease")?;
        tx.commit().db_context("Failed to commit transaction")?;
        Ok(true)
    }

    /// Drops the lease if `owner` still holds it.
    pub fn release_lease(&mut self, plan_id: u64, owner: &str) -> Result<()> {
        self.connection
            .execute(RELEASE_LEASE_SQL, params![plan_id as i64, owner])
            .db_context("Failed to release lease")?;
        Ok(())
    }
}
