//! Schema operations available to migrations.

use crate::executor::{DbError, SqlExecutor};
use may_postgres::types::ToSql;

/// Wraps the executor a migration runs on, normally an open transaction.
pub struct SchemaManager<'a> {
    executor: &'a dyn SqlExecutor,
}

impl<'a> SchemaManager<'a> {
    pub fn new(executor: &'a dyn SqlExecutor) -> Self {
        Self { executor }
    }

    /// Execute one statement.
    pub fn execute(&self, sql: &str, params: &[&dyn ToSql]) -> Result<(), DbError> {
        self.executor.execute(sql, params).map(|_| ())
    }

    /// Execute parameterless statements in order, stopping at the first failure.
    pub fn execute_all(&self, statements: &[&str]) -> Result<(), DbError> {
        for sql in statements {
            self.execute(sql, &[])?;
        }
        Ok(())
    }

    pub fn has_table(&self, table: &str) -> Result<bool, DbError> {
        let row = self.executor.query_opt(
            "SELECT 1 FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1",
            &[&table],
        )?;
        Ok(row.is_some())
    }

    pub fn executor(&self) -> &dyn SqlExecutor {
        self.executor
    }
}
