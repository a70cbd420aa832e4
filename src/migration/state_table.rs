//! The `safeledger_migrations` state table.

use crate::executor::{DbError, SqlExecutor};

pub const STATE_TABLE: &str = "safeledger_migrations";

/// Create the state table if it does not exist.
pub fn initialize_state_table(executor: &dyn SqlExecutor) -> Result<(), DbError> {
    executor.execute(
        r#"
        CREATE TABLE IF NOT EXISTS safeledger_migrations (
            version BIGINT PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            checksum VARCHAR(64) NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL,
            execution_time_ms BIGINT
        )
        "#,
        &[],
    )?;
    Ok(())
}
