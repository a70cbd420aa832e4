//! Migration execution.

use super::state_table::initialize_state_table;
use super::{
    ledger, Migration, MigrationError, MigrationRecord, MigrationStatus, PendingMigration,
    SchemaManager,
};
use crate::executor::{PgExecutor, SqlExecutor};
use crate::transaction::Transaction;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Instant;

/// Advisory lock key held while a migration runs, so concurrent migrators apply each
/// version once.
const MIGRATION_LOCK_KEY: i64 = 0x5AFE_1ED6;

pub struct Migrator {
    /// Ascending by version.
    migrations: Vec<Box<dyn Migration>>,
}

impl Migrator {
    pub fn new(mut migrations: Vec<Box<dyn Migration>>) -> Self {
        migrations.sort_by_key(|m| m.version());
        Self { migrations }
    }

    /// The migrations that create the ledger schema.
    pub fn ledger() -> Self {
        Self::new(ledger::migrations())
    }

    pub fn migrations(&self) -> impl Iterator<Item = &dyn Migration> {
        self.migrations.iter().map(|m| m.as_ref())
    }

    /// Compare the state table with the known migrations, validating checksums.
    pub fn status(&self, executor: &dyn SqlExecutor) -> Result<MigrationStatus, MigrationError> {
        initialize_state_table(executor)?;
        let mut applied: HashMap<i64, MigrationRecord> = Self::applied_records(executor)?
            .into_iter()
            .map(|r| (r.version, r))
            .collect();

        let mut status = MigrationStatus {
            applied: Vec::new(),
            pending: Vec::new(),
        };
        for migration in &self.migrations {
            let current = migration.checksum();
            match applied.remove(&migration.version()) {
                Some(record) if record.checksum != current => {
                    return Err(MigrationError::ChecksumMismatch {
                        version: record.version,
                        name: record.name,
                        stored: record.checksum,
                        current,
                    });
                }
                Some(record) => status.applied.push(record),
                None => status.pending.push(PendingMigration {
                    version: migration.version(),
                    name: migration.name().to_string(),
                    checksum: current,
                }),
            }
        }

        if let Some(unknown) = applied.into_values().min_by_key(|r| r.version) {
            return Err(MigrationError::UnknownMigration {
                version: unknown.version,
                name: unknown.name,
            });
        }
        Ok(status)
    }

    /// Apply up to `steps` pending migrations (all when `None`), oldest first. Each
    /// migration and its state row commit together.
    pub fn up(
        &self,
        executor: &PgExecutor,
        steps: Option<usize>,
    ) -> Result<Vec<MigrationRecord>, MigrationError> {
        let status = self.status(executor)?;
        let take = steps.unwrap_or(status.pending.len());
        let mut applied = Vec::new();

        for pending in status.pending.iter().take(take) {
            let Some(migration) = self.find(pending.version) else {
                continue;
            };
            let tx = Self::locked(executor)?;
            if Self::is_recorded(&tx, pending.version)? {
                log::debug!("migration {} applied concurrently, skipping", pending.version);
                tx.commit()?;
                continue;
            }

            let start = Instant::now();
            migration
                .up(&SchemaManager::new(&tx))
                .map_err(|source| MigrationError::ExecutionFailed {
                    version: pending.version,
                    name: pending.name.clone(),
                    source,
                })?;
            let record = MigrationRecord {
                version: pending.version,
                name: pending.name.clone(),
                checksum: pending.checksum.clone(),
                applied_at: Utc::now(),
                execution_time_ms: i64::try_from(start.elapsed().as_millis()).ok(),
            };
            tx.execute(
                "INSERT INTO safeledger_migrations (version, name, checksum, applied_at, execution_time_ms) \
                 VALUES ($1, $2, $3, $4, $5)",
                &[
                    &record.version,
                    &record.name,
                    &record.checksum,
                    &record.applied_at,
                    &record.execution_time_ms,
                ],
            )?;
            tx.commit()?;
            log::info!(
                "applied migration {} ({}) in {:?}",
                record.version,
                record.name,
                start.elapsed()
            );
            applied.push(record);
        }
        Ok(applied)
    }

    /// Revert the newest `steps` applied migrations, newest first.
    pub fn down(
        &self,
        executor: &PgExecutor,
        steps: usize,
    ) -> Result<Vec<MigrationRecord>, MigrationError> {
        let status = self.status(executor)?;
        let mut reverted = Vec::new();

        for record in status.applied.into_iter().rev().take(steps) {
            let Some(migration) = self.find(record.version) else {
                continue;
            };
            let tx = Self::locked(executor)?;
            if !Self::is_recorded(&tx, record.version)? {
                tx.commit()?;
                continue;
            }
            migration
                .down(&SchemaManager::new(&tx))
                .map_err(|source| MigrationError::ExecutionFailed {
                    version: record.version,
                    name: record.name.clone(),
                    source,
                })?;
            tx.execute(
                "DELETE FROM safeledger_migrations WHERE version = $1",
                &[&record.version],
            )?;
            tx.commit()?;
            log::info!("reverted migration {} ({})", record.version, record.name);
            reverted.push(record);
        }
        Ok(reverted)
    }

    fn find(&self, version: i64) -> Option<&dyn Migration> {
        self.migrations()
            .find(|m| m.version() == version)
    }

    fn locked(executor: &PgExecutor) -> Result<Transaction, MigrationError> {
        let tx = executor.begin()?;
        tx.execute("SELECT pg_advisory_xact_lock($1)", &[&MIGRATION_LOCK_KEY])?;
        Ok(tx)
    }

    fn is_recorded(tx: &Transaction, version: i64) -> Result<bool, MigrationError> {
        Ok(tx
            .query_opt(
                "SELECT version FROM safeledger_migrations WHERE version = $1",
                &[&version],
            )?
            .is_some())
    }

    fn applied_records(executor: &dyn SqlExecutor) -> Result<Vec<MigrationRecord>, MigrationError> {
        executor
            .query_all(
                "SELECT version, name, checksum, applied_at, execution_time_ms \
                 FROM safeledger_migrations ORDER BY version",
                &[],
            )?
            .iter()
            .map(MigrationRecord::from_row)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_migrations_are_ordered_and_unique() {
        let migrator = Migrator::ledger();
        let versions: Vec<i64> = migrator.migrations().map(|m| m.version()).collect();
        assert!(!versions.is_empty());
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_ledger_checksums_differ_per_migration() {
        let migrator = Migrator::ledger();
        let mut sums: Vec<String> = migrator.migrations().map(|m| m.checksum()).collect();
        let total = sums.len();
        sums.sort();
        sums.dedup();
        assert_eq!(sums.len(), total);
    }
}
