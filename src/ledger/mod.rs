//! Safe, voucher and transfer ledgers, and the [`Ledger`] entry point.
//!
//! Every mutation validates first and writes last, inside one unit of work. Safes whose
//! balance will change are locked before their balance is read, two at a time in
//! ascending id order.

mod balance;
mod safes;
mod transfers;
mod vouchers;

pub use safes::SafeStore;
pub use transfers::TransferLedger;
pub use vouchers::VoucherLedger;

use crate::config::LedgerSettings;
use crate::error::Result;
use crate::obligations::ObligationTracker;
use crate::ownership::{Directory, OwnershipGraph};
use crate::revenue::RevenueCalculator;
use crate::store::LedgerStore;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// The ledger core over one store. Cheap to share behind an `Arc`; every component
/// handle borrows it.
pub struct Ledger<S> {
    store: S,
    settings: LedgerSettings,
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: S) -> Self {
        Self::with_settings(store, LedgerSettings::default())
    }

    pub fn with_settings(store: S, settings: LedgerSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    pub fn safes(&self) -> SafeStore<'_, S> {
        SafeStore::new(&self.store)
    }

    pub fn vouchers(&self) -> VoucherLedger<'_, S> {
        VoucherLedger::new(&self.store)
    }

    pub fn transfers(&self) -> TransferLedger<'_, S> {
        TransferLedger::new(&self.store)
    }

    pub fn directory(&self) -> Directory<'_, S> {
        Directory::new(&self.store)
    }

    pub fn ownership(&self) -> OwnershipGraph<'_, S> {
        OwnershipGraph::new(&self.store)
    }

    pub fn revenue(&self) -> RevenueCalculator<'_, S> {
        RevenueCalculator::new(&self.store)
    }

    pub fn obligations(&self) -> ObligationTracker<'_, S> {
        ObligationTracker::new(&self.store, &self.settings)
    }
}

/// Wrap a mutating operation in its span and outcome counters.
pub(crate) fn instrument<T>(
    component: &'static str,
    operation: &'static str,
    run: impl FnOnce() -> Result<T>,
) -> Result<T> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::ledger_op_span(component, operation).entered();
    #[cfg(not(feature = "tracing"))]
    let _ = component;

    let result = run();

    #[cfg(feature = "metrics")]
    match &result {
        Ok(_) => METRICS.record_posting(operation),
        Err(e) if e.is_rejection() => METRICS.record_rejection(operation),
        Err(_) => {}
    }
    #[cfg(not(feature = "metrics"))]
    let _ = operation;

    result
}
