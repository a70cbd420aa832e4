//! Migration trait.

use super::checksum::statements_checksum;
use super::schema_manager::SchemaManager;
use crate::executor::DbError;

/// One versioned schema change.
///
/// Runs synchronously; under the `may` runtime the driver yields the coroutine while
/// waiting on the server.
pub trait Migration: Send + Sync {
    fn name(&self) -> &str;

    /// Ordering key, `YYYYMMDDHHMMSS`.
    fn version(&self) -> i64;

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), DbError>;

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), DbError>;

    /// Fingerprint compared against the state table on every run.
    fn checksum(&self) -> String;
}

/// A migration made of plain SQL statements run in order.
pub struct SqlMigration {
    pub version: i64,
    pub name: &'static str,
    pub up: &'static [&'static str],
    pub down: &'static [&'static str],
}

impl Migration for SqlMigration {
    fn name(&self) -> &str {
        self.name
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), DbError> {
        manager.execute_all(self.up)
    }

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), DbError> {
        manager.execute_all(self.down)
    }

    fn checksum(&self) -> String {
        statements_checksum(self.up, self.down)
    }
}
