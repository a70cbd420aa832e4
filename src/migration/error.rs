//! Migration errors.

use crate::error::StoreError;
use crate::executor::DbError;
use crate::transaction::TransactionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("database error: {0}")]
    Database(#[from] DbError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(
        "migration '{name}' (version {version}) was modified after being applied \
         (stored checksum {stored}, current {current})"
    )]
    ChecksumMismatch {
        version: i64,
        name: String,
        stored: String,
        current: String,
    },

    /// The database records a migration this build does not know about.
    #[error("applied migration '{name}' (version {version}) is unknown to this build")]
    UnknownMigration { version: i64, name: String },

    #[error("migration '{name}' (version {version}) failed: {source}")]
    ExecutionFailed {
        version: i64,
        name: String,
        #[source]
        source: DbError,
    },
}

impl From<may_postgres::Error> for MigrationError {
    fn from(err: may_postgres::Error) -> Self {
        MigrationError::Database(DbError::Postgres(err))
    }
}
