use super::{RecordState, SafeId, TransferId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Funds moved from one safe to another.
///
/// Amount and endpoints are fixed once recorded; a wrong transfer is corrected by
/// deleting it (which reverses it) and recording a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub from_safe: SafeId,
    pub to_safe: SafeId,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: RecordState,
}

impl Transfer {
    /// Signed effect of this transfer on `safe`; zero if the safe is not an endpoint.
    pub fn delta_for(&self, safe: SafeId) -> Decimal {
        if safe == self.from_safe {
            -self.amount
        } else if safe == self.to_safe {
            self.amount
        } else {
            Decimal::ZERO
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransfer {
    pub from_safe: SafeId,
    pub to_safe: SafeId,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub description: String,
}

impl NewTransfer {
    pub fn new(from_safe: SafeId, to_safe: SafeId, amount: Decimal, description: impl Into<String>) -> Self {
        Self {
            from_safe,
            to_safe,
            amount,
            date: Utc::now().date_naive(),
            description: description.into(),
        }
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }
}

/// Requested changes to a transfer.
///
/// Only `description` and `date` may differ from the stored values; the other fields
/// are accepted solely when they repeat what is already recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferAmendment {
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    pub from_safe: Option<SafeId>,
    pub to_safe: Option<SafeId>,
}

/// A posted (or reversed) transfer and the resulting balances of both safes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferPosting {
    pub transfer: Transfer,
    pub from_balance: Decimal,
    pub to_balance: Decimal,
}
