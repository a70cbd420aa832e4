//! Rows of the `safeledger_migrations` state table.

use super::MigrationError;
use crate::executor::DbError;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    /// `YYYYMMDDHHMMSS`
    pub version: i64,
    pub name: String,
    /// SHA-256 of the migration's statements when it was applied.
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
    pub execution_time_ms: Option<i64>,
}

impl MigrationRecord {
    pub fn from_row(row: &may_postgres::Row) -> Result<Self, MigrationError> {
        let column = |e: may_postgres::Error| {
            MigrationError::Database(DbError::Other(format!("malformed migration record: {e}")))
        };
        Ok(Self {
            version: row.try_get("version").map_err(column)?,
            name: row.try_get("name").map_err(column)?,
            checksum: row.try_get("checksum").map_err(column)?,
            applied_at: row.try_get("applied_at").map_err(column)?,
            execution_time_ms: row.try_get("execution_time_ms").map_err(column)?,
        })
    }
}
