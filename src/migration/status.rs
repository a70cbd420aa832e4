//! Applied versus pending migrations.

use super::MigrationRecord;

#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Ascending by version.
    pub applied: Vec<MigrationRecord>,
    /// Ascending by version.
    pub pending: Vec<PendingMigration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMigration {
    pub version: i64,
    pub name: String,
    pub checksum: String,
}

impl MigrationStatus {
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn latest_applied_version(&self) -> Option<i64> {
        self.applied.iter().map(|m| m.version).max()
    }

    pub fn next_pending_version(&self) -> Option<i64> {
        self.pending.first().map(|m| m.version)
    }
}
