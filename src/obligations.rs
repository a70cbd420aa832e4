//! Broker dues and partner debts.
//!
//! Obligations are schedule records. Nothing here reads or writes a safe; paying an
//! obligation only flips its status.

use crate::config::LedgerSettings;
use crate::error::{LedgerError, Result};
use crate::filter::ObligationFilter;
use crate::ledger::instrument;
use crate::model::{
    BrokerId, NewObligation, Obligation, ObligationId, ObligationKind, ObligationStats,
    ObligationStatus, ObligationUpdate, Party, PartnerId, RecordState,
};
use crate::ownership::{active_broker, active_partner};
use crate::store::{LedgerStore, LedgerTx};
use crate::validation::{checked_total, ensure_positive_amount};
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;

pub struct ObligationTracker<'a, S> {
    store: &'a S,
    settings: &'a LedgerSettings,
}

impl<'a, S: LedgerStore> ObligationTracker<'a, S> {
    pub(crate) fn new(store: &'a S, settings: &'a LedgerSettings) -> Self {
        Self { store, settings }
    }

    /// Record an obligation; its kind follows from the party.
    pub fn record(&self, input: NewObligation) -> Result<Obligation> {
        instrument("obligations", "record", || {
            ensure_positive_amount(input.amount)?;
            self.store.transaction(|tx| {
                match input.party {
                    Party::Broker(id) => {
                        active_broker(tx, id)?;
                    }
                    Party::Partner(id) => {
                        active_partner(tx, id)?;
                    }
                }
                let now = Utc::now();
                let obligation = Obligation {
                    id: ObligationId::new(),
                    party: input.party,
                    amount: input.amount,
                    due_date: input.due_date,
                    notes: input.notes,
                    status: ObligationStatus::Pending,
                    paid_at: None,
                    created_at: now,
                    updated_at: now,
                    state: RecordState::Active,
                };
                tx.insert_obligation(&obligation)?;
                Ok(obligation)
            })
        })
    }

    pub fn record_broker_due(
        &self,
        broker: BrokerId,
        amount: Decimal,
        due_date: NaiveDate,
        notes: Option<String>,
    ) -> Result<Obligation> {
        self.record(NewObligation {
            party: Party::Broker(broker),
            amount,
            due_date,
            notes,
        })
    }

    pub fn record_partner_debt(
        &self,
        partner: PartnerId,
        amount: Decimal,
        due_date: NaiveDate,
        notes: Option<String>,
    ) -> Result<Obligation> {
        self.record(NewObligation {
            party: Party::Partner(partner),
            amount,
            due_date,
            notes,
        })
    }

    /// Mark paid and stamp `paid_at`. Re-applying only refreshes the timestamps.
    pub fn mark_paid(&self, kind: ObligationKind, id: ObligationId) -> Result<Obligation> {
        instrument("obligations", "mark_paid", || {
            self.set_status(kind, id, ObligationStatus::Paid)
        })
    }

    /// Back to pending; clears `paid_at`.
    pub fn mark_unpaid(&self, kind: ObligationKind, id: ObligationId) -> Result<Obligation> {
        instrument("obligations", "mark_unpaid", || {
            self.set_status(kind, id, ObligationStatus::Pending)
        })
    }

    fn set_status(
        &self,
        kind: ObligationKind,
        id: ObligationId,
        status: ObligationStatus,
    ) -> Result<Obligation> {
        self.store.transaction(|tx| {
            let mut obligation = lock_active(tx, kind, id)?;
            let now = Utc::now();
            obligation.status = status;
            obligation.paid_at = match status {
                ObligationStatus::Paid => Some(now),
                ObligationStatus::Pending => None,
            };
            obligation.updated_at = now;
            tx.update_obligation(&obligation)?;
            Ok(obligation)
        })
    }

    pub fn update(
        &self,
        kind: ObligationKind,
        id: ObligationId,
        changes: ObligationUpdate,
    ) -> Result<Obligation> {
        instrument("obligations", "update", || {
            if let Some(amount) = changes.amount {
                ensure_positive_amount(amount)?;
            }
            self.store.transaction(|tx| {
                let mut obligation = lock_active(tx, kind, id)?;
                if let Some(amount) = changes.amount {
                    obligation.amount = amount;
                }
                if let Some(due_date) = changes.due_date {
                    obligation.due_date = due_date;
                }
                if changes.notes.is_some() {
                    obligation.notes = changes.notes;
                }
                obligation.updated_at = Utc::now();
                tx.update_obligation(&obligation)?;
                Ok(obligation)
            })
        })
    }

    pub fn soft_delete(&self, kind: ObligationKind, id: ObligationId) -> Result<Obligation> {
        instrument("obligations", "soft_delete", || {
            self.store.transaction(|tx| {
                let mut obligation = lock_active(tx, kind, id)?;
                let now = Utc::now();
                obligation.state = RecordState::Deleted { at: now };
                obligation.updated_at = now;
                tx.update_obligation(&obligation)?;
                Ok(obligation)
            })
        })
    }

    pub fn get(&self, kind: ObligationKind, id: ObligationId) -> Result<Obligation> {
        self.store.snapshot(|tx| match tx.get_obligation(kind, id)? {
            Some(obligation) if obligation.state.is_active() => Ok(obligation),
            _ => Err(LedgerError::not_found(kind.entity(), id)),
        })
    }

    /// Obligations of one kind matching `filter`, by due date.
    pub fn list(&self, kind: ObligationKind, filter: &ObligationFilter) -> Result<Vec<Obligation>> {
        filter.validate()?;
        self.store.snapshot(|tx| Ok(tx.find_obligations(kind, filter)?))
    }

    /// Counts and sums of the active obligations of one kind, overdue judged at `as_of`.
    pub fn stats(&self, kind: ObligationKind, as_of: NaiveDate) -> Result<ObligationStats> {
        let all = self.list(kind, &ObligationFilter::default())?;
        all.iter().try_fold(ObligationStats::default(), |mut stats, o| {
            stats.total_count += 1;
            stats.total_amount = checked_total(stats.total_amount, o.amount)?;
            match o.status {
                ObligationStatus::Pending => {
                    stats.pending_count += 1;
                    stats.pending_amount = checked_total(stats.pending_amount, o.amount)?;
                }
                ObligationStatus::Paid => {
                    stats.paid_count += 1;
                    stats.paid_amount = checked_total(stats.paid_amount, o.amount)?;
                }
            }
            if o.is_overdue(as_of) {
                stats.overdue_count += 1;
                stats.overdue_amount = checked_total(stats.overdue_amount, o.amount)?;
            }
            Ok(stats)
        })
    }

    /// Pending obligations due strictly before `as_of`.
    pub fn overdue(&self, kind: ObligationKind, as_of: NaiveDate) -> Result<Vec<Obligation>> {
        let filter = ObligationFilter {
            due_to: as_of.pred_opt(),
            ..ObligationFilter::pending()
        };
        if filter.due_to.is_none() {
            return Ok(Vec::new());
        }
        self.list(kind, &filter)
    }

    /// Pending obligations due between `as_of` and `as_of + window_days`, inclusive.
    pub fn upcoming(
        &self,
        kind: ObligationKind,
        as_of: NaiveDate,
        window_days: u32,
    ) -> Result<Vec<Obligation>> {
        let until = as_of
            .checked_add_signed(Duration::days(i64::from(window_days)))
            .unwrap_or(NaiveDate::MAX);
        let filter = ObligationFilter {
            due_from: Some(as_of),
            due_to: Some(until),
            ..ObligationFilter::pending()
        };
        self.list(kind, &filter)
    }

    pub fn stats_today(&self, kind: ObligationKind) -> Result<ObligationStats> {
        self.stats(kind, today())
    }

    pub fn overdue_today(&self, kind: ObligationKind) -> Result<Vec<Obligation>> {
        self.overdue(kind, today())
    }

    /// Upcoming from today over the configured window.
    pub fn upcoming_default(&self, kind: ObligationKind) -> Result<Vec<Obligation>> {
        self.upcoming(kind, today(), self.settings.upcoming_window_days)
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn lock_active(tx: &mut dyn LedgerTx, kind: ObligationKind, id: ObligationId) -> Result<Obligation> {
    match tx.lock_obligation(kind, id)? {
        Some(obligation) if obligation.state.is_active() => Ok(obligation),
        _ => Err(LedgerError::not_found(kind.entity(), id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use crate::store::MemoryStore;

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn date(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_paid_at_follows_status() {
        let ledger = Ledger::new(MemoryStore::new());
        let broker = ledger.directory().create_broker("Samir", None).unwrap();
        let due = ledger
            .obligations()
            .record_broker_due(broker.id, d(500), date(2024, 5, 1), None)
            .unwrap();
        assert_eq!(due.status, ObligationStatus::Pending);

        let paid = ledger
            .obligations()
            .mark_paid(ObligationKind::BrokerDue, due.id)
            .unwrap();
        assert_eq!(paid.status, ObligationStatus::Paid);
        assert!(paid.paid_at.is_some());

        let again = ledger
            .obligations()
            .mark_paid(ObligationKind::BrokerDue, due.id)
            .unwrap();
        assert!(again.updated_at >= paid.updated_at);

        let unpaid = ledger
            .obligations()
            .mark_unpaid(ObligationKind::BrokerDue, due.id)
            .unwrap();
        assert_eq!(unpaid.status, ObligationStatus::Pending);
        assert_eq!(unpaid.paid_at, None);
    }

    #[test]
    fn test_record_validates_amount_and_party() {
        let ledger = Ledger::new(MemoryStore::new());
        let partner = ledger.directory().create_partner("Lina", None, None).unwrap();
        assert!(matches!(
            ledger
                .obligations()
                .record_partner_debt(partner.id, d(0), date(2024, 1, 1), None),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            ledger
                .obligations()
                .record_broker_due(BrokerId::new(), d(10), date(2024, 1, 1), None),
            Err(LedgerError::NotFound { .. })
        ));
    }

    #[test]
    fn test_wrong_kind_lookup_is_not_found() {
        let ledger = Ledger::new(MemoryStore::new());
        let partner = ledger.directory().create_partner("Lina", None, None).unwrap();
        let debt = ledger
            .obligations()
            .record_partner_debt(partner.id, d(10), date(2024, 1, 1), None)
            .unwrap();
        assert!(ledger.obligations().get(ObligationKind::PartnerDebt, debt.id).is_ok());
        assert!(matches!(
            ledger.obligations().get(ObligationKind::BrokerDue, debt.id),
            Err(LedgerError::NotFound { .. })
        ));
    }

    #[test]
    fn test_overdue_upcoming_and_stats() {
        let ledger = Ledger::new(MemoryStore::new());
        let broker = ledger.directory().create_broker("Samir", None).unwrap();
        let tracker = ledger.obligations();
        let as_of = date(2024, 6, 15);
        let late = tracker
            .record_broker_due(broker.id, d(100), date(2024, 6, 14), None)
            .unwrap();
        tracker
            .record_broker_due(broker.id, d(200), as_of, None)
            .unwrap();
        tracker
            .record_broker_due(broker.id, d(300), date(2024, 6, 25), None)
            .unwrap();
        let paid = tracker
            .record_broker_due(broker.id, d(400), date(2024, 6, 1), None)
            .unwrap();
        tracker.mark_paid(ObligationKind::BrokerDue, paid.id).unwrap();

        let overdue = tracker.overdue(ObligationKind::BrokerDue, as_of).unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].id, late.id);

        let upcoming = tracker.upcoming(ObligationKind::BrokerDue, as_of, 10).unwrap();
        assert_eq!(upcoming.len(), 2);
        assert_eq!(tracker.upcoming(ObligationKind::BrokerDue, as_of, 0).unwrap().len(), 1);

        let stats = tracker.stats(ObligationKind::BrokerDue, as_of).unwrap();
        assert_eq!(stats.total_count, 4);
        assert_eq!(stats.total_amount, d(1000));
        assert_eq!(stats.pending_count, 3);
        assert_eq!(stats.paid_amount, d(400));
        assert_eq!(stats.overdue_count, 1);
        assert_eq!(stats.overdue_amount, d(100));

        tracker.soft_delete(ObligationKind::BrokerDue, late.id).unwrap();
        let stats = tracker.stats(ObligationKind::BrokerDue, as_of).unwrap();
        assert_eq!(stats.overdue_count, 0);
        assert_eq!(stats.total_count, 3);
    }

    #[test]
    fn test_update_rejects_bad_amount_and_keeps_row() {
        let ledger = Ledger::new(MemoryStore::new());
        let partner = ledger.directory().create_partner("Lina", None, None).unwrap();
        let debt = ledger
            .obligations()
            .record_partner_debt(partner.id, d(10), date(2024, 1, 1), Some("loan".into()))
            .unwrap();
        let bad = ObligationUpdate {
            amount: Some(d(-5)),
            ..ObligationUpdate::default()
        };
        assert!(ledger
            .obligations()
            .update(ObligationKind::PartnerDebt, debt.id, bad)
            .is_err());
        let good = ObligationUpdate {
            due_date: Some(date(2024, 2, 1)),
            ..ObligationUpdate::default()
        };
        let updated = ledger
            .obligations()
            .update(ObligationKind::PartnerDebt, debt.id, good)
            .unwrap();
        assert_eq!(updated.due_date, date(2024, 2, 1));
        assert_eq!(updated.amount, d(10));
        assert_eq!(updated.notes.as_deref(), Some("loan"));
    }
}
