use super::{RecordState, SafeId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A named money-holding account.
///
/// `balance` always equals `opening_balance` plus the net of every active voucher and
/// transfer touching the safe. Only the voucher and transfer ledgers write it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Safe {
    pub id: SafeId,
    pub name: String,
    pub opening_balance: Decimal,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: RecordState,
}

impl Safe {
    pub fn new(name: impl Into<String>, opening_balance: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: SafeId::new(),
            name: name.into(),
            opening_balance,
            balance: opening_balance,
            created_at: now,
            updated_at: now,
            state: RecordState::Active,
        }
    }
}

/// Result of recomputing a safe's balance from its movements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub safe_id: SafeId,
    /// The balance stored on the safe.
    pub recorded: Decimal,
    /// Opening balance plus the net of active movements.
    pub computed: Decimal,
    pub difference: Decimal,
}

impl Reconciliation {
    pub fn is_balanced(&self) -> bool {
        self.difference.is_zero()
    }
}

/// Where a statement line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "id", rename_all = "snake_case")]
pub enum MovementSource {
    Voucher(super::VoucherId),
    Transfer(super::TransferId),
}

/// One line of a safe statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub source: MovementSource,
    pub date: chrono::NaiveDate,
    pub description: String,
    /// Signed effect on the safe: positive credits, negative debits.
    pub delta: Decimal,
    /// Balance after this line, starting from the opening balance.
    pub running_balance: Decimal,
    pub recorded_at: DateTime<Utc>,
}
