//! SQLite persistence for plans, steps, messages and dispatch leases.
//!
//! [`Database`] wraps a single `rusqlite` connection. The query methods are
//! spread over submodules (`plan_queries`, `step_queries`, ...) as `impl`
//! blocks on the same type. Every multi-row write runs inside one
//! `IMMEDIATE` transaction so concurrent connections serialize on the write
//! lock instead of failing half-way.

use std::{path::Path, time::Duration};

use jiff::Timestamp;
use rusqlite::{types::Type, Connection};
use serde::de::DeserializeOwned;

use crate::error::{DatabaseResultExt, Result};

pub mod lease_queries;
pub mod message_queries;
pub mod migrations;
pub mod plan_queries;
pub mod step_queries;

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Database connection and operations handler.
pub struct Database {
    connection: Connection,
}

impl Database {
    /// Opens a connection and initializes the schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = Self::connect(path)?;
        db.initialize_schema()?;
        Ok(db)
    }

    /// Opens a connection to an already initialized database.
    ///
    /// Only per-connection settings are applied; the schema, the journal
    /// mode and the migrations are left to [`Database::new`].
    pub fn connect<P: AsRef<Path>>(path: P) -> Result<Self> {
        let connection = Connection::open(path).db_context("Failed to open database connection")?;
        connection
            .busy_timeout(BUSY_TIMEOUT)
            .db_context("Failed to set busy timeout")?;
        connection
            .execute("PRAGMA foreign_keys = ON", [])
            .db_context("Failed to enable foreign keys")?;
        Ok(Self { connection })
    }
}

/// Parses a timestamp column.
pub(crate) fn timestamp_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Timestamp> {
    row.get::<_, String>(idx)?
        .parse::<Timestamp>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Parses a nullable timestamp column.
pub(crate) fn optional_timestamp_column(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<Option<Timestamp>> {
    row.get::<_, Option<String>>(idx)?
        .map(|s| {
            s.parse::<Timestamp>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
            })
        })
        .transpose()
}

/// Parses a JSON text column.
pub(crate) fn json_column<T: DeserializeOwned>(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Parses a text column through `FromStr`.
pub(crate) fn parsed_column<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}
