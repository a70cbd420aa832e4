//! Error types returned by the ledger core.
//!
//! Every business rule is checked before any write, so a returned [`LedgerError`]
//! always means nothing was persisted.

use crate::connection::ConnectionError;
use crate::executor::DbError;
use crate::model::{EntityKind, GroupId, SafeId, TransferId, UnitId};
use crate::transaction::TransactionError;
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Backing-store failures. These are infrastructure errors, not rule violations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error("connection pool: {0}")]
    Pool(String),
    /// An UPDATE matched no row.
    #[error("no {table} row {id} to update")]
    RowMissing { table: &'static str, id: Uuid },
    #[error("cannot decode {table} row: {reason}")]
    Decode { table: &'static str, reason: String },
    #[error("store lock poisoned by a panicked writer")]
    Poisoned,
}

impl From<may_postgres::Error> for StoreError {
    fn from(err: may_postgres::Error) -> Self {
        StoreError::Db(DbError::Postgres(err))
    }
}

/// Which percentage total overflowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PercentageScope {
    /// Direct partner links of a unit.
    Unit(UnitId),
    /// Memberships of a partner group.
    Group(GroupId),
}

impl fmt::Display for PercentageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PercentageScope::Unit(id) => write!(f, "unit {id} direct partners"),
            PercentageScope::Group(id) => write!(f, "group {id} members"),
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: Uuid },

    #[error("invalid amount {0}: must be positive, below 10^15, with at most 4 decimal places")]
    InvalidAmount(Decimal),

    #[error("insufficient balance in safe {safe_id}: balance {balance}, change {delta}")]
    InsufficientBalance {
        safe_id: SafeId,
        balance: Decimal,
        delta: Decimal,
    },

    #[error("cannot transfer from safe {0} to itself")]
    SameSafeTransfer(SafeId),

    #[error("transfer {0}: amount and safes cannot be changed; delete the transfer and record a new one")]
    ImmutableTransferFields(TransferId),

    #[error("{scope} would total {attempted}% (currently {current}%), over 100%")]
    PercentageOverflow {
        scope: PercentageScope,
        current: Decimal,
        attempted: Decimal,
    },

    #[error("invalid percentage {0}: must be greater than 0 and at most 100, with at most 4 decimal places")]
    InvalidPercentage(Decimal),

    #[error("safe {safe_id} is still referenced by {movements} active voucher(s)/transfer(s)")]
    SafeInUse { safe_id: SafeId, movements: u64 },

    #[error("duplicate link: {0}")]
    DuplicateLink(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    pub fn not_found(entity: EntityKind, id: impl Into<Uuid>) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// True for rule violations, false for backing-store failures.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, LedgerError::Store(_))
    }
}

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_names_entity() {
        let id = SafeId::new();
        let err = LedgerError::not_found(EntityKind::Safe, id);
        assert_eq!(err.to_string(), format!("safe {id} not found"));
        assert!(err.is_rejection());
    }

    #[test]
    fn test_percentage_overflow_display() {
        let unit = UnitId::new();
        let err = LedgerError::PercentageOverflow {
            scope: PercentageScope::Unit(unit),
            current: Decimal::from(50),
            attempted: Decimal::from(120),
        };
        let text = err.to_string();
        assert!(text.contains("120%"));
        assert!(text.contains("currently 50%"));
        assert!(text.contains(&unit.to_string()));
    }

    #[test]
    fn test_store_errors_are_not_rejections() {
        let err: LedgerError = StoreError::Poisoned.into();
        assert!(!err.is_rejection());
    }
}
