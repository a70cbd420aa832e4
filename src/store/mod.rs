//! Persistence seam.
//!
//! A [`LedgerStore`] hands out units of work. Inside one, the ledger components see a
//! [`LedgerTx`]: plain row operations with no business rules. Everything written inside
//! [`LedgerStore::transaction`] commits together if the closure returns `Ok` and is
//! discarded if it returns `Err`.
//!
//! `lock_*` methods return the row and hold an exclusive lock on it until the unit of
//! work ends. Writers lock every safe they are about to change before reading its
//! balance, so concurrent postings against one safe are serialized.

mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::error::{Result, StoreError};
use crate::filter::{ObligationFilter, TransferFilter, VoucherFilter};
use crate::model::*;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

pub trait LedgerStore: Send + Sync {
    /// Run `work` atomically.
    fn transaction<T>(&self, work: impl FnOnce(&mut dyn LedgerTx) -> Result<T>) -> Result<T>;

    /// Run `work` against committed state without writing. `lock_*` calls inside a
    /// snapshot behave like the plain getters.
    fn snapshot<T>(&self, work: impl FnOnce(&mut dyn LedgerTx) -> Result<T>) -> Result<T>;
}

/// Row operations available inside a unit of work.
///
/// `get_*` return rows regardless of their [`RecordState`]; callers decide what a
/// deleted row means. Collection getters return active rows only, unless a filter or an
/// `include_deleted` flag says otherwise.
pub trait LedgerTx {
    // Safes
    fn insert_safe(&mut self, safe: &Safe) -> StoreResult<()>;
    fn get_safe(&mut self, id: SafeId) -> StoreResult<Option<Safe>>;
    fn lock_safe(&mut self, id: SafeId) -> StoreResult<Option<Safe>>;
    fn update_safe(&mut self, safe: &Safe) -> StoreResult<()>;
    fn list_safes(&mut self, include_deleted: bool) -> StoreResult<Vec<Safe>>;

    // Vouchers
    fn insert_voucher(&mut self, voucher: &Voucher) -> StoreResult<()>;
    fn get_voucher(&mut self, id: VoucherId) -> StoreResult<Option<Voucher>>;
    fn lock_voucher(&mut self, id: VoucherId) -> StoreResult<Option<Voucher>>;
    fn update_voucher(&mut self, voucher: &Voucher) -> StoreResult<()>;
    /// Ordered by date, then creation time.
    fn find_vouchers(&mut self, filter: &VoucherFilter) -> StoreResult<Vec<Voucher>>;

    // Transfers
    fn insert_transfer(&mut self, transfer: &Transfer) -> StoreResult<()>;
    fn get_transfer(&mut self, id: TransferId) -> StoreResult<Option<Transfer>>;
    fn lock_transfer(&mut self, id: TransferId) -> StoreResult<Option<Transfer>>;
    fn update_transfer(&mut self, transfer: &Transfer) -> StoreResult<()>;
    /// Ordered by date, then creation time.
    fn find_transfers(&mut self, filter: &TransferFilter) -> StoreResult<Vec<Transfer>>;

    // Units and partners
    fn insert_unit(&mut self, unit: &Unit) -> StoreResult<()>;
    fn get_unit(&mut self, id: UnitId) -> StoreResult<Option<Unit>>;
    fn lock_unit(&mut self, id: UnitId) -> StoreResult<Option<Unit>>;
    fn update_unit(&mut self, unit: &Unit) -> StoreResult<()>;
    fn list_units(&mut self) -> StoreResult<Vec<Unit>>;

    fn insert_partner(&mut self, partner: &Partner) -> StoreResult<()>;
    fn get_partner(&mut self, id: PartnerId) -> StoreResult<Option<Partner>>;
    fn update_partner(&mut self, partner: &Partner) -> StoreResult<()>;
    fn list_partners(&mut self) -> StoreResult<Vec<Partner>>;

    // Groups and memberships
    fn insert_group(&mut self, group: &PartnerGroup) -> StoreResult<()>;
    fn get_group(&mut self, id: GroupId) -> StoreResult<Option<PartnerGroup>>;
    fn lock_group(&mut self, id: GroupId) -> StoreResult<Option<PartnerGroup>>;
    fn list_groups(&mut self) -> StoreResult<Vec<PartnerGroup>>;

    fn insert_member(&mut self, member: &GroupMember) -> StoreResult<()>;
    fn get_member(&mut self, id: MemberId) -> StoreResult<Option<GroupMember>>;
    fn update_member(&mut self, member: &GroupMember) -> StoreResult<()>;
    fn active_members_of_group(&mut self, group: GroupId) -> StoreResult<Vec<GroupMember>>;
    fn active_memberships_of_partner(&mut self, partner: PartnerId) -> StoreResult<Vec<GroupMember>>;

    // Direct unit links
    fn insert_unit_partner(&mut self, link: &UnitPartner) -> StoreResult<()>;
    fn get_unit_partner(&mut self, id: UnitPartnerId) -> StoreResult<Option<UnitPartner>>;
    fn update_unit_partner(&mut self, link: &UnitPartner) -> StoreResult<()>;
    fn active_partners_of_unit(&mut self, unit: UnitId) -> StoreResult<Vec<UnitPartner>>;
    fn active_units_of_partner(&mut self, partner: PartnerId) -> StoreResult<Vec<UnitPartner>>;

    // Unit ↔ group links
    fn insert_unit_group(&mut self, link: &UnitGroupLink) -> StoreResult<()>;
    fn get_unit_group(&mut self, id: UnitGroupId) -> StoreResult<Option<UnitGroupLink>>;
    fn update_unit_group(&mut self, link: &UnitGroupLink) -> StoreResult<()>;
    fn active_groups_of_unit(&mut self, unit: UnitId) -> StoreResult<Vec<UnitGroupLink>>;
    fn active_units_of_group(&mut self, group: GroupId) -> StoreResult<Vec<UnitGroupLink>>;

    // Brokers and obligations
    fn insert_broker(&mut self, broker: &Broker) -> StoreResult<()>;
    fn get_broker(&mut self, id: BrokerId) -> StoreResult<Option<Broker>>;
    fn update_broker(&mut self, broker: &Broker) -> StoreResult<()>;
    fn list_brokers(&mut self) -> StoreResult<Vec<Broker>>;

    fn insert_obligation(&mut self, obligation: &Obligation) -> StoreResult<()>;
    fn get_obligation(&mut self, kind: ObligationKind, id: ObligationId) -> StoreResult<Option<Obligation>>;
    fn lock_obligation(&mut self, kind: ObligationKind, id: ObligationId) -> StoreResult<Option<Obligation>>;
    fn update_obligation(&mut self, obligation: &Obligation) -> StoreResult<()>;
    /// Ordered by due date.
    fn find_obligations(&mut self, kind: ObligationKind, filter: &ObligationFilter) -> StoreResult<Vec<Obligation>>;
}
