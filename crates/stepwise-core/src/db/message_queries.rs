//! Append-only message log.

use jiff::Timestamp;
use rusqlite::params;

use super::{parsed_column, timestamp_column};
use crate::{
    error::{DatabaseResultExt, Result},
    models::{Message, MessageRole, NewMessage},
};

const MESSAGE_COLUMNS: &str = "id, session_id, plan_id, step_id, agent_name, role, content, created_at";
const INSERT_MESSAGE_SQL: &str = "INSERT INTO messages (session_id, plan_id, step_id, agent_name, role, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

impl super::Database {
    fn build_message_from_row(row: &rusqlite::Row) -> rusqlite::Result<Message> {
        Ok(Message {
            id: row.get::<_, i64>(0)? as u64,
            session_id: row.get(1)?,
            plan_id: row.get::<_, i64>(2)? as u64,
            step_id: row.get::<_, Option<i64>>(3)?.map(|id| id as u64),
            agent_name: row.get(4)?,
            role: parsed_column::<MessageRole>(row, 5)?,
            content: row.get(6)?,
            created_at: timestamp_column(row, 7)?,
        })
    }

    pub fn append_message(&mut self, message: &NewMessage) -> Result<Message> {
        let now = Timestamp::now();
        self.connection
            .execute(
                INSERT_MESSAGE_SQL,
                params![
                    &message.session_id,
                    message.plan_id as i64,
                    message.step_id.map(|id| id as i64),
                    &message.agent_name,
                    message.role.as_str(),
                    &message.content,
                    now.to_string()
                ],
            )
            .db_context("Failed to insert message")?;

        Ok(Message {
            id: self.connection.last_insert_rowid() as u64,
            session_id: message.session_id.clone(),
            plan_id: message.plan_id,
            step_id: message.step_id,
            agent_name: message.agent_name.clone(),
            role: message.role,
            content: message.content.clone(),
            created_at: now,
        })
    }

    /// Messages of a session (optionally one plan), in append order.
    pub fn get_messages(&self, session_id: &str, plan_id: Option<u64>) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE session_id = ?1 AND (?2 IS NULL OR plan_id = ?2) ORDER BY id"
        );
        let mut stmt = self
            .connection
            .prepare(&sql)
            .db_context("Failed to prepare query")?;
        let messages = stmt
            .query_map(
                params![session_id, plan_id.map(|id| id as i64)],
                Self::build_message_from_row,
            )
            .db_context("Failed to query messages")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .db_context("Failed to parse message data")?;
        Ok(messages)
    }

    /// The `limit` most recent messages of a plan, oldest first.
    pub fn recent_messages(
        &self,
        session_id: &str,
        plan_id: u64,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE session_id = ?1 AND plan_id = ?2 ORDER BY id DESC LIMIT ?3"
        );
        let mut stmt = self
            .connection
            .prepare(&sql)
            .db_context("Failed to prepare query")?;
        let mut messages = stmt
            .query_map(
                params![session_id, plan_id as i64, limit as i64],
                Self::build_message_from_row,
            )
            .db_context("Failed to query messages")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .db_context("Failed to parse message data")?;
        messages.reverse();
        Ok(messages)
    }
}
