//! Database transactions.
//!
//! A [`Transaction`] is one `BEGIN … COMMIT` unit of work on a single connection. If it
//! is dropped without [`commit`](Transaction::commit) or
//! [`rollback`](Transaction::rollback), it rolls back, so row locks taken with
//! `SELECT … FOR UPDATE` are released on every exit path, including panics and early
//! returns through `?`.

use crate::executor::{instrumented, DbError, SqlExecutor};
use may_postgres::types::ToSql;
use may_postgres::{Client, Error as PostgresError, Row};
use std::fmt;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Transaction error type
#[derive(Debug)]
pub enum TransactionError {
    /// PostgreSQL error from may_postgres
    Postgres(PostgresError),
    /// Transaction already committed or rolled back
    Closed,
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionError::Postgres(e) => write!(f, "PostgreSQL error: {e}"),
            TransactionError::Closed => {
                write!(f, "Transaction has already been committed or rolled back")
            }
        }
    }
}

impl std::error::Error for TransactionError {}

impl From<PostgresError> for TransactionError {
    fn from(err: PostgresError) -> Self {
        TransactionError::Postgres(err)
    }
}

pub struct Transaction {
    client: Client,
    closed: bool,
}

impl Transaction {
    /// Issue `BEGIN` on `client`. Postgres' default `READ COMMITTED` isolation applies;
    /// writers serialize on the rows they lock.
    pub(crate) fn new(client: Client) -> Result<Self, TransactionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span().entered();

        client.execute("BEGIN", &[])?;
        log::trace!("transaction started");

        Ok(Self {
            client,
            closed: false,
        })
    }

    pub fn commit(mut self) -> Result<(), TransactionError> {
        if self.closed {
            return Err(TransactionError::Closed);
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::commit_transaction_span().entered();

        // Mark closed first: if COMMIT itself fails the server has already aborted the
        // transaction and Drop must not issue a second ROLLBACK.
        self.closed = true;
        self.client.execute("COMMIT", &[])?;
        log::trace!("transaction committed");
        Ok(())
    }

    pub fn rollback(mut self) -> Result<(), TransactionError> {
        if self.closed {
            return Err(TransactionError::Closed);
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::rollback_transaction_span().entered();

        self.closed = true;
        self.client.execute("ROLLBACK", &[])?;
        log::trace!("transaction rolled back");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.client.execute("ROLLBACK", &[]) {
                log::warn!("rollback of abandoned transaction failed: {e}");
            }
        }
    }
}

impl SqlExecutor for Transaction {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError> {
        if self.closed {
            return Err(DbError::Other("Transaction is closed".to_string()));
        }
        instrumented(query, || self.client.execute(query, params))
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError> {
        if self.closed {
            return Err(DbError::Other("Transaction is closed".to_string()));
        }
        instrumented(query, || self.client.query(query, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_error_display() {
        let err = TransactionError::Closed;
        assert!(err
            .to_string()
            .contains("Transaction has already been committed"));
    }
}
