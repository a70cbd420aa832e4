//! Schema migrations for the ledger tables.
//!
//! Migrations are compiled into the crate and applied in version order by the
//! [`Migrator`]. Each applied migration is recorded in `safeledger_migrations` with a
//! SHA-256 checksum of its statements; a migration whose statements changed after it
//! was applied stops the migrator instead of silently drifting.

pub mod checksum;
pub mod error;
mod ledger;
pub mod migration;
pub mod migrator;
pub mod record;
pub mod schema_manager;
pub mod state_table;
pub mod status;

pub use error::MigrationError;
pub use migration::Migration;
pub use migrator::Migrator;
pub use record::MigrationRecord;
pub use schema_manager::SchemaManager;
pub use status::{MigrationStatus, PendingMigration};
