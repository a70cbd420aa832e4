//! In-process store.
//!
//! All tables live behind one mutex. A unit of work clones the tables, runs against the
//! copy and swaps it back in only when the closure returns `Ok`, so a rejected or
//! failed operation leaves nothing behind. Holding the mutex for the whole unit of work
//! serializes writers, which is what `lock_*` promises.

use super::{LedgerStore, LedgerTx, StoreResult};
use crate::error::{Result, StoreError};
use crate::filter::{ObligationFilter, TransferFilter, VoucherFilter};
use crate::model::*;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Default)]
struct Tables {
    safes: HashMap<SafeId, Safe>,
    vouchers: HashMap<VoucherId, Voucher>,
    transfers: HashMap<TransferId, Transfer>,
    units: HashMap<UnitId, Unit>,
    partners: HashMap<PartnerId, Partner>,
    groups: HashMap<GroupId, PartnerGroup>,
    members: HashMap<MemberId, GroupMember>,
    unit_partners: HashMap<UnitPartnerId, UnitPartner>,
    unit_groups: HashMap<UnitGroupId, UnitGroupLink>,
    brokers: HashMap<BrokerId, Broker>,
    broker_dues: HashMap<ObligationId, Obligation>,
    partner_debts: HashMap<ObligationId, Obligation>,
}

impl Tables {
    fn obligations(&self, kind: ObligationKind) -> &HashMap<ObligationId, Obligation> {
        match kind {
            ObligationKind::BrokerDue => &self.broker_dues,
            ObligationKind::PartnerDebt => &self.partner_debts,
        }
    }

    fn obligations_mut(&mut self, kind: ObligationKind) -> &mut HashMap<ObligationId, Obligation> {
        match kind {
            ObligationKind::BrokerDue => &mut self.broker_dues,
            ObligationKind::PartnerDebt => &mut self.partner_debts,
        }
    }
}

/// Thread-safe in-memory [`LedgerStore`]. Used by the test suites and by callers that
/// do not need durability.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl LedgerStore for MemoryStore {
    fn transaction<T>(&self, work: impl FnOnce(&mut dyn LedgerTx) -> Result<T>) -> Result<T> {
        let mut guard = self.lock()?;
        let mut tx = MemoryTx {
            tables: guard.clone(),
        };
        let out = work(&mut tx)?;
        *guard = tx.tables;
        Ok(out)
    }

    fn snapshot<T>(&self, work: impl FnOnce(&mut dyn LedgerTx) -> Result<T>) -> Result<T> {
        let tables = self.lock()?.clone();
        work(&mut MemoryTx { tables })
    }
}

struct MemoryTx {
    tables: Tables,
}

fn insert<K: Eq + Hash, V: Clone>(table: &mut HashMap<K, V>, key: K, row: &V) -> StoreResult<()> {
    table.insert(key, row.clone());
    Ok(())
}

fn replace<K, V>(
    table: &mut HashMap<K, V>,
    name: &'static str,
    key: K,
    row: &V,
) -> StoreResult<()>
where
    K: Eq + Hash + Copy + Into<uuid::Uuid>,
    V: Clone,
{
    match table.get_mut(&key) {
        Some(slot) => {
            *slot = row.clone();
            Ok(())
        }
        None => Err(StoreError::RowMissing {
            table: name,
            id: key.into(),
        }),
    }
}

fn fetch<K: Eq + Hash, V: Clone>(table: &HashMap<K, V>, key: &K) -> StoreResult<Option<V>> {
    Ok(table.get(key).cloned())
}

/// Rows satisfying `keep`, sorted with `order`.
fn select<V: Clone, O: Ord>(
    table: &HashMap<impl Eq + Hash, V>,
    keep: impl Fn(&V) -> bool,
    order: impl Fn(&V) -> O,
) -> StoreResult<Vec<V>> {
    let mut rows: Vec<V> = table.values().filter(|row| keep(row)).cloned().collect();
    rows.sort_by_key(|row| order(row));
    Ok(rows)
}

impl LedgerTx for MemoryTx {
    fn insert_safe(&mut self, safe: &Safe) -> StoreResult<()> {
        insert(&mut self.tables.safes, safe.id, safe)
    }

    fn get_safe(&mut self, id: SafeId) -> StoreResult<Option<Safe>> {
        fetch(&self.tables.safes, &id)
    }

    fn lock_safe(&mut self, id: SafeId) -> StoreResult<Option<Safe>> {
        self.get_safe(id)
    }

    fn update_safe(&mut self, safe: &Safe) -> StoreResult<()> {
        replace(&mut self.tables.safes, "safes", safe.id, safe)
    }

    fn list_safes(&mut self, include_deleted: bool) -> StoreResult<Vec<Safe>> {
        select(
            &self.tables.safes,
            |s| include_deleted || s.state.is_active(),
            |s| (s.name.clone(), s.id),
        )
    }

    fn insert_voucher(&mut self, voucher: &Voucher) -> StoreResult<()> {
        insert(&mut self.tables.vouchers, voucher.id, voucher)
    }

    fn get_voucher(&mut self, id: VoucherId) -> StoreResult<Option<Voucher>> {
        fetch(&self.tables.vouchers, &id)
    }

    fn lock_voucher(&mut self, id: VoucherId) -> StoreResult<Option<Voucher>> {
        self.get_voucher(id)
    }

    fn update_voucher(&mut self, voucher: &Voucher) -> StoreResult<()> {
        replace(&mut self.tables.vouchers, "vouchers", voucher.id, voucher)
    }

    fn find_vouchers(&mut self, filter: &VoucherFilter) -> StoreResult<Vec<Voucher>> {
        select(
            &self.tables.vouchers,
            |v| filter.matches(v),
            |v| (v.date, v.created_at, v.id),
        )
    }

    fn insert_transfer(&mut self, transfer: &Transfer) -> StoreResult<()> {
        insert(&mut self.tables.transfers, transfer.id, transfer)
    }

    fn get_transfer(&mut self, id: TransferId) -> StoreResult<Option<Transfer>> {
        fetch(&self.tables.transfers, &id)
    }

    fn lock_transfer(&mut self, id: TransferId) -> StoreResult<Option<Transfer>> {
        self.get_transfer(id)
    }

    fn update_transfer(&mut self, transfer: &Transfer) -> StoreResult<()> {
        replace(&mut self.tables.transfers, "transfers", transfer.id, transfer)
    }

    fn find_transfers(&mut self, filter: &TransferFilter) -> StoreResult<Vec<Transfer>> {
        select(
            &self.tables.transfers,
            |t| filter.matches(t),
            |t| (t.date, t.created_at, t.id),
        )
    }

    fn insert_unit(&mut self, unit: &Unit) -> StoreResult<()> {
        insert(&mut self.tables.units, unit.id, unit)
    }

    fn get_unit(&mut self, id: UnitId) -> StoreResult<Option<Unit>> {
        fetch(&self.tables.units, &id)
    }

    fn lock_unit(&mut self, id: UnitId) -> StoreResult<Option<Unit>> {
        self.get_unit(id)
    }

    fn update_unit(&mut self, unit: &Unit) -> StoreResult<()> {
        replace(&mut self.tables.units, "units", unit.id, unit)
    }

    fn list_units(&mut self) -> StoreResult<Vec<Unit>> {
        select(
            &self.tables.units,
            |u| u.state.is_active(),
            |u| (u.name.clone(), u.id),
        )
    }

    fn insert_partner(&mut self, partner: &Partner) -> StoreResult<()> {
        insert(&mut self.tables.partners, partner.id, partner)
    }

    fn get_partner(&mut self, id: PartnerId) -> StoreResult<Option<Partner>> {
        fetch(&self.tables.partners, &id)
    }

    fn update_partner(&mut self, partner: &Partner) -> StoreResult<()> {
        replace(&mut self.tables.partners, "partners", partner.id, partner)
    }

    fn list_partners(&mut self) -> StoreResult<Vec<Partner>> {
        select(
            &self.tables.partners,
            |p| p.state.is_active(),
            |p| (p.name.clone(), p.id),
        )
    }

    fn insert_group(&mut self, group: &PartnerGroup) -> StoreResult<()> {
        insert(&mut self.tables.groups, group.id, group)
    }

    fn get_group(&mut self, id: GroupId) -> StoreResult<Option<PartnerGroup>> {
        fetch(&self.tables.groups, &id)
    }

    fn lock_group(&mut self, id: GroupId) -> StoreResult<Option<PartnerGroup>> {
        self.get_group(id)
    }

    fn list_groups(&mut self) -> StoreResult<Vec<PartnerGroup>> {
        select(
            &self.tables.groups,
            |g| g.state.is_active(),
            |g| (g.name.clone(), g.id),
        )
    }

    fn insert_member(&mut self, member: &GroupMember) -> StoreResult<()> {
        insert(&mut self.tables.members, member.id, member)
    }

    fn get_member(&mut self, id: MemberId) -> StoreResult<Option<GroupMember>> {
        fetch(&self.tables.members, &id)
    }

    fn update_member(&mut self, member: &GroupMember) -> StoreResult<()> {
        replace(&mut self.tables.members, "partner_group_partners", member.id, member)
    }

    fn active_members_of_group(&mut self, group: GroupId) -> StoreResult<Vec<GroupMember>> {
        select(
            &self.tables.members,
            |m| m.group_id == group && m.state.is_active(),
            |m| (m.created_at, m.id),
        )
    }

    fn active_memberships_of_partner(&mut self, partner: PartnerId) -> StoreResult<Vec<GroupMember>> {
        select(
            &self.tables.members,
            |m| m.partner_id == partner && m.state.is_active(),
            |m| (m.created_at, m.id),
        )
    }

    fn insert_unit_partner(&mut self, link: &UnitPartner) -> StoreResult<()> {
        insert(&mut self.tables.unit_partners, link.id, link)
    }

    fn get_unit_partner(&mut self, id: UnitPartnerId) -> StoreResult<Option<UnitPartner>> {
        fetch(&self.tables.unit_partners, &id)
    }

    fn update_unit_partner(&mut self, link: &UnitPartner) -> StoreResult<()> {
        replace(&mut self.tables.unit_partners, "unit_partners", link.id, link)
    }

    fn active_partners_of_unit(&mut self, unit: UnitId) -> StoreResult<Vec<UnitPartner>> {
        select(
            &self.tables.unit_partners,
            |l| l.unit_id == unit && l.state.is_active(),
            |l| (l.created_at, l.id),
        )
    }

    fn active_units_of_partner(&mut self, partner: PartnerId) -> StoreResult<Vec<UnitPartner>> {
        select(
            &self.tables.unit_partners,
            |l| l.partner_id == partner && l.state.is_active(),
            |l| (l.created_at, l.id),
        )
    }

    fn insert_unit_group(&mut self, link: &UnitGroupLink) -> StoreResult<()> {
        insert(&mut self.tables.unit_groups, link.id, link)
    }

    fn get_unit_group(&mut self, id: UnitGroupId) -> StoreResult<Option<UnitGroupLink>> {
        fetch(&self.tables.unit_groups, &id)
    }

    fn update_unit_group(&mut self, link: &UnitGroupLink) -> StoreResult<()> {
        replace(&mut self.tables.unit_groups, "unit_partner_groups", link.id, link)
    }

    fn active_groups_of_unit(&mut self, unit: UnitId) -> StoreResult<Vec<UnitGroupLink>> {
        select(
            &self.tables.unit_groups,
            |l| l.unit_id == unit && l.state.is_active(),
            |l| (l.created_at, l.id),
        )
    }

    fn active_units_of_group(&mut self, group: GroupId) -> StoreResult<Vec<UnitGroupLink>> {
        select(
            &self.tables.unit_groups,
            |l| l.group_id == group && l.state.is_active(),
            |l| (l.created_at, l.id),
        )
    }

    fn insert_broker(&mut self, broker: &Broker) -> StoreResult<()> {
        insert(&mut self.tables.brokers, broker.id, broker)
    }

    fn get_broker(&mut self, id: BrokerId) -> StoreResult<Option<Broker>> {
        fetch(&self.tables.brokers, &id)
    }

    fn update_broker(&mut self, broker: &Broker) -> StoreResult<()> {
        replace(&mut self.tables.brokers, "brokers", broker.id, broker)
    }

    fn list_brokers(&mut self) -> StoreResult<Vec<Broker>> {
        select(
            &self.tables.brokers,
            |b| b.state.is_active(),
            |b| (b.name.clone(), b.id),
        )
    }

    fn insert_obligation(&mut self, obligation: &Obligation) -> StoreResult<()> {
        insert(
            self.tables.obligations_mut(obligation.kind()),
            obligation.id,
            obligation,
        )
    }

    fn get_obligation(&mut self, kind: ObligationKind, id: ObligationId) -> StoreResult<Option<Obligation>> {
        fetch(self.tables.obligations(kind), &id)
    }

    fn lock_obligation(&mut self, kind: ObligationKind, id: ObligationId) -> StoreResult<Option<Obligation>> {
        self.get_obligation(kind, id)
    }

    fn update_obligation(&mut self, obligation: &Obligation) -> StoreResult<()> {
        let kind = obligation.kind();
        let name = match kind {
            ObligationKind::BrokerDue => "broker_dues",
            ObligationKind::PartnerDebt => "partner_debts",
        };
        replace(self.tables.obligations_mut(kind), name, obligation.id, obligation)
    }

    fn find_obligations(
        &mut self,
        kind: ObligationKind,
        filter: &ObligationFilter,
    ) -> StoreResult<Vec<Obligation>> {
        select(
            self.tables.obligations(kind),
            |o| filter.matches(o),
            |o| (o.due_date, o.created_at, o.id),
        )
    }
}
