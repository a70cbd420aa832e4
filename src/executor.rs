//! SQL execution over `may_postgres`.
//!
//! [`SqlExecutor`] abstracts "something that can run a statement": a bare client or an
//! open [`Transaction`](crate::transaction::Transaction). The Postgres store only talks
//! to this trait, so every statement it issues gets the same span and latency recording.

use may_postgres::types::ToSql;
use may_postgres::{Client, Error as PostgresError, Row};
use std::fmt;
use std::time::Instant;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Statement execution error
#[derive(Debug)]
pub enum DbError {
    /// `PostgreSQL` error from `may_postgres`
    Postgres(PostgresError),
    /// Statement could not be built or was rejected before reaching the server
    Query(String),
    /// Other execution errors
    Other(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::Postgres(e) => write!(f, "PostgreSQL error: {e}"),
            DbError::Query(s) => write!(f, "Query error: {s}"),
            DbError::Other(s) => write!(f, "Execution error: {s}"),
        }
    }
}

impl std::error::Error for DbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DbError::Postgres(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PostgresError> for DbError {
    fn from(err: PostgresError) -> Self {
        DbError::Postgres(err)
    }
}

/// Runs parameterised SQL.
pub trait SqlExecutor {
    /// Execute a statement and return the number of rows affected.
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError>;

    /// Execute a query and return all rows.
    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError>;

    /// Execute a query expected to return at most one row.
    ///
    /// Unlike `Client::query_one`, zero rows is `Ok(None)` rather than an error, which is
    /// how the store reports a missing record.
    fn query_opt(&self, query: &str, params: &[&dyn ToSql]) -> Result<Option<Row>, DbError> {
        let mut rows = self.query_all(query, params)?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            n => Err(DbError::Query(format!("expected at most one row, got {n}"))),
        }
    }
}

/// Shared instrumentation for every executor implementation.
pub(crate) fn instrumented<T>(
    query: &str,
    run: impl FnOnce() -> Result<T, PostgresError>,
) -> Result<T, DbError> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::execute_query_span(query).entered();
    #[cfg(not(feature = "tracing"))]
    let _ = query;

    let start = Instant::now();
    let result = run().map_err(|e| {
        #[cfg(feature = "metrics")]
        METRICS.record_query_error();
        DbError::Postgres(e)
    });

    let duration = start.elapsed();
    #[cfg(feature = "metrics")]
    METRICS.record_query_duration(duration);
    log::trace!("statement finished in {:?}", duration);

    result
}

/// Executor over a single `may_postgres::Client`, outside any transaction.
pub struct PgExecutor {
    client: Client,
}

impl PgExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn into_client(self) -> Client {
        self.client
    }

    /// Start a `READ COMMITTED` transaction on this executor's connection.
    pub fn begin(&self) -> Result<crate::transaction::Transaction, crate::transaction::TransactionError> {
        crate::transaction::Transaction::new(self.client.clone())
    }

    /// Run `SELECT 1` to check the connection is alive.
    pub fn check_health(&self) -> Result<bool, DbError> {
        crate::connection::check_connection_health(&self.client)
            .map_err(|e| DbError::Other(format!("Health check error: {e}")))
    }
}

impl SqlExecutor for PgExecutor {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError> {
        instrumented(query, || self.client.execute(query, params))
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError> {
        instrumented(query, || self.client.query(query, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_error_display() {
        let err = DbError::Query("expected at most one row, got 2".to_string());
        assert!(err.to_string().contains("Query error"));
        assert!(err.to_string().contains("got 2"));

        let err = DbError::Other("boom".to_string());
        assert!(err.to_string().contains("Execution error"));
    }
}
