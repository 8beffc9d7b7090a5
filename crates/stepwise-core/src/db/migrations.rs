//! Database schema initialization and migrations.

use crate::error::{DatabaseResultExt, Result};

/// Columns added after the first schema release: (table, column, definition).
const ADDED_COLUMNS: &[(&str, &str, &str)] = &[
    ("steps", "feedback", "TEXT"),
    ("steps", "started_at", "TEXT"),
    ("steps", "finished_at", "TEXT"),
    ("plans", "cancel_requested", "INTEGER NOT NULL DEFAULT 0"),
    ("plans", "halt_reason", "TEXT"),
];

impl super::Database {
    /// Initializes the database schema using the embedded SQL file.
    pub(super) fn initialize_schema(&self) -> Result<()> {
        // journal_mode answers with the resulting mode, so it cannot go
        // through execute()
        let _mode: String = self
            .connection
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .db_context("Failed to enable WAL journal")?;

        let schema_sql = include_str!("../../assets/schema.sql");
        self.connection
            .execute_batch(schema_sql)
            .db_context("Failed to initialize database schema")?;

        self.apply_migrations()
    }

    /// Adds columns missing from databases created by older versions.
    fn apply_migrations(&self) -> Result<()> {
        for (table, column, definition) in ADDED_COLUMNS {
            if !self.has_column(table, column)? {
                log::info!("Migrating: adding {table}.{column}");
                self.connection
                    .execute(
                        &format!("ALTER TABLE {table} ADD COLUMN {column} {definition}"),
                        [],
                    )
                    .db_context("Failed to add missing column")?;
            }
        }
        Ok(())
    }

    fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        self.connection
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
                [table, column],
                |row| row.get::<_, i64>(0),
            )
            .map(|count| count > 0)
            .db_context("Failed to inspect table columns")
    }
}
