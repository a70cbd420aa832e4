//! PostgreSQL store on `may_postgres`.
//!
//! Each unit of work checks a connection out of the [`ConnectionPool`], opens a
//! [`Transaction`] and sets a local `lock_timeout`, so a writer blocked on a row lock
//! fails with a store error instead of waiting forever. `lock_*` reads use
//! `SELECT … FOR UPDATE`. Snapshots run `REPEATABLE READ, READ ONLY`, so every read in
//! one snapshot sees the same committed state.

mod query;
mod rows;

use super::{LedgerStore, LedgerTx, StoreResult};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result, StoreError};
use crate::executor::{PgExecutor, SqlExecutor};
use crate::filter::{ObligationFilter, TransferFilter, VoucherFilter};
use crate::migration::{MigrationError, MigrationRecord, Migrator};
use crate::model::*;
use crate::pool::{ConnectionPool, PooledConnection};
use crate::transaction::Transaction;
use may_postgres::types::ToSql;
use may_postgres::Row;
use std::time::Duration;
use uuid::Uuid;

pub struct PgStore {
    pool: ConnectionPool,
    lock_timeout: Duration,
}

impl PgStore {
    /// Open the pool described by `config.database`.
    pub fn connect(config: &LedgerConfig) -> Result<Self, StoreError> {
        let pool = ConnectionPool::open(&config.database)?;
        Ok(Self::from_pool(pool, config.ledger.lock_timeout()))
    }

    pub fn from_pool(pool: ConnectionPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Apply every pending schema migration.
    pub fn migrate(&self) -> Result<Vec<MigrationRecord>, MigrationError> {
        let conn = self.pool.acquire()?;
        let executor = PgExecutor::new((*conn).clone());
        Migrator::ledger().up(&executor, None)
    }

    fn begin(&self, conn: &mut PooledConnection<'_>) -> Result<Transaction, StoreError> {
        match Transaction::new((**conn).clone()) {
            Ok(tx) => Ok(tx),
            Err(e) => {
                conn.mark_broken();
                Err(e.into())
            }
        }
    }

    fn finish<T>(conn: &mut PooledConnection<'_>, tx: Transaction, out: Result<T>) -> Result<T> {
        match out {
            Ok(value) => {
                if let Err(e) = tx.commit() {
                    conn.mark_broken();
                    return Err(StoreError::from(e).into());
                }
                Ok(value)
            }
            Err(err) => {
                if let Err(e) = tx.rollback() {
                    log::warn!("rollback after failed unit of work failed: {e}");
                    conn.mark_broken();
                }
                Err(err)
            }
        }
    }
}

impl LedgerStore for PgStore {
    fn transaction<T>(&self, work: impl FnOnce(&mut dyn LedgerTx) -> Result<T>) -> Result<T> {
        let mut conn = self.pool.acquire()?;
        let tx = self.begin(&mut conn)?;
        let out = tx
            .execute(
                &format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis()),
                &[],
            )
            .map_err(|e| LedgerError::from(StoreError::from(e)))
            .and_then(|_| {
                work(&mut PgTx {
                    tx: &tx,
                    read_only: false,
                })
            });
        Self::finish(&mut conn, tx, out)
    }

    fn snapshot<T>(&self, work: impl FnOnce(&mut dyn LedgerTx) -> Result<T>) -> Result<T> {
        let mut conn = self.pool.acquire()?;
        let tx = self.begin(&mut conn)?;
        let out = tx
            .execute("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY", &[])
            .map_err(|e| LedgerError::from(StoreError::from(e)))
            .and_then(|_| {
                work(&mut PgTx {
                    tx: &tx,
                    read_only: true,
                })
            });
        Self::finish(&mut conn, tx, out)
    }
}

/// Row operations over one open transaction.
struct PgTx<'t> {
    tx: &'t Transaction,
    read_only: bool,
}

impl PgTx<'_> {
    fn one<T>(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
        decode: impl Fn(&Row) -> StoreResult<T>,
    ) -> StoreResult<Option<T>> {
        self.tx.query_opt(sql, params)?.as_ref().map(decode).transpose()
    }

    fn many<T>(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
        decode: impl Fn(&Row) -> StoreResult<T>,
    ) -> StoreResult<Vec<T>> {
        self.tx.query_all(sql, params)?.iter().map(decode).collect()
    }

    fn write(&self, sql: &str, params: &[&dyn ToSql]) -> StoreResult<()> {
        self.tx.execute(sql, params)?;
        Ok(())
    }

    /// Run an UPDATE that must hit exactly the row `id`.
    fn update(&self, table: &'static str, id: Uuid, sql: &str, params: &[&dyn ToSql]) -> StoreResult<()> {
        match self.tx.execute(sql, params)? {
            0 => Err(StoreError::RowMissing { table, id }),
            _ => Ok(()),
        }
    }

    fn by_id<T>(
        &self,
        table: &str,
        columns: &str,
        id: Uuid,
        lock: bool,
        decode: impl Fn(&Row) -> StoreResult<T>,
    ) -> StoreResult<Option<T>> {
        let suffix = if lock && !self.read_only { " FOR UPDATE" } else { "" };
        let sql = format!("SELECT {columns} FROM {table} WHERE id = $1{suffix}");
        self.one(&sql, &[&id], decode)
    }

    fn active_by(&self, table: &str, columns: &str, column: &str) -> String {
        format!(
            "SELECT {columns} FROM {table} WHERE {column} = $1 AND deleted_at IS NULL \
             ORDER BY created_at, id"
        )
    }

    fn active_named(&self, table: &str, columns: &str) -> String {
        format!("SELECT {columns} FROM {table} WHERE deleted_at IS NULL ORDER BY name, id")
    }
}

impl LedgerTx for PgTx<'_> {
    fn insert_safe(&mut self, safe: &Safe) -> StoreResult<()> {
        self.write(
            "INSERT INTO safes (id, name, opening_balance, balance, created_at, updated_at, deleted_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[
                &safe.id.0,
                &safe.name,
                &safe.opening_balance,
                &safe.balance,
                &safe.created_at,
                &safe.updated_at,
                &safe.state.deleted_at(),
            ],
        )
    }

    fn get_safe(&mut self, id: SafeId) -> StoreResult<Option<Safe>> {
        self.by_id("safes", rows::SAFE_COLUMNS, id.0, false, rows::safe)
    }

    fn lock_safe(&mut self, id: SafeId) -> StoreResult<Option<Safe>> {
        self.by_id("safes", rows::SAFE_COLUMNS, id.0, true, rows::safe)
    }

    fn update_safe(&mut self, safe: &Safe) -> StoreResult<()> {
        self.update(
            "safes",
            safe.id.0,
            "UPDATE safes SET name = $2, opening_balance = $3, balance = $4, updated_at = $5, \
             deleted_at = $6 WHERE id = $1",
            &[
                &safe.id.0,
                &safe.name,
                &safe.opening_balance,
                &safe.balance,
                &safe.updated_at,
                &safe.state.deleted_at(),
            ],
        )
    }

    fn list_safes(&mut self, include_deleted: bool) -> StoreResult<Vec<Safe>> {
        let sql = format!(
            "SELECT {} FROM safes WHERE ($1 OR deleted_at IS NULL) ORDER BY name, id",
            rows::SAFE_COLUMNS
        );
        self.many(&sql, &[&include_deleted], rows::safe)
    }

    fn insert_voucher(&mut self, voucher: &Voucher) -> StoreResult<()> {
        let (link_type, link_id) = voucher.linked.map(VoucherLink::to_columns).unzip();
        self.write(
            "INSERT INTO vouchers (id, kind, date, amount, safe_id, description, payer, beneficiary, \
             link_type, link_id, created_at, updated_at, deleted_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            &[
                &voucher.id.0,
                &voucher.kind.as_str(),
                &voucher.date,
                &voucher.amount,
                &voucher.safe_id.0,
                &voucher.description,
                &voucher.payer,
                &voucher.beneficiary,
                &link_type,
                &link_id,
                &voucher.created_at,
                &voucher.updated_at,
                &voucher.state.deleted_at(),
            ],
        )
    }

    fn get_voucher(&mut self, id: VoucherId) -> StoreResult<Option<Voucher>> {
        self.by_id("vouchers", rows::VOUCHER_COLUMNS, id.0, false, rows::voucher)
    }

    fn lock_voucher(&mut self, id: VoucherId) -> StoreResult<Option<Voucher>> {
        self.by_id("vouchers", rows::VOUCHER_COLUMNS, id.0, true, rows::voucher)
    }

    fn update_voucher(&mut self, voucher: &Voucher) -> StoreResult<()> {
        let (link_type, link_id) = voucher.linked.map(VoucherLink::to_columns).unzip();
        self.update(
            "vouchers",
            voucher.id.0,
            "UPDATE vouchers SET kind = $2, date = $3, amount = $4, safe_id = $5, description = $6, \
             payer = $7, beneficiary = $8, link_type = $9, link_id = $10, updated_at = $11, \
             deleted_at = $12 WHERE id = $1",
            &[
                &voucher.id.0,
                &voucher.kind.as_str(),
                &voucher.date,
                &voucher.amount,
                &voucher.safe_id.0,
                &voucher.description,
                &voucher.payer,
                &voucher.beneficiary,
                &link_type,
                &link_id,
                &voucher.updated_at,
                &voucher.state.deleted_at(),
            ],
        )
    }

    fn find_vouchers(&mut self, filter: &VoucherFilter) -> StoreResult<Vec<Voucher>> {
        let (sql, values) = query::vouchers(filter);
        query::with_converted_params(&values, |params| self.many(&sql, params, rows::voucher))
    }

    fn insert_transfer(&mut self, transfer: &Transfer) -> StoreResult<()> {
        self.write(
            "INSERT INTO transfers (id, from_safe_id, to_safe_id, amount, date, description, \
             created_at, updated_at, deleted_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            &[
                &transfer.id.0,
                &transfer.from_safe.0,
                &transfer.to_safe.0,
                &transfer.amount,
                &transfer.date,
                &transfer.description,
                &transfer.created_at,
                &transfer.updated_at,
                &transfer.state.deleted_at(),
            ],
        )
    }

    fn get_transfer(&mut self, id: TransferId) -> StoreResult<Option<Transfer>> {
        self.by_id("transfers", rows::TRANSFER_COLUMNS, id.0, false, rows::transfer)
    }

    fn lock_transfer(&mut self, id: TransferId) -> StoreResult<Option<Transfer>> {
        self.by_id("transfers", rows::TRANSFER_COLUMNS, id.0, true, rows::transfer)
    }

    fn update_transfer(&mut self, transfer: &Transfer) -> StoreResult<()> {
        // Amount and endpoints are never rewritten.
        self.update(
            "transfers",
            transfer.id.0,
            "UPDATE transfers SET date = $2, description = $3, updated_at = $4, deleted_at = $5 \
             WHERE id = $1",
            &[
                &transfer.id.0,
                &transfer.date,
                &transfer.description,
                &transfer.updated_at,
                &transfer.state.deleted_at(),
            ],
        )
    }

    fn find_transfers(&mut self, filter: &TransferFilter) -> StoreResult<Vec<Transfer>> {
        let (sql, values) = query::transfers(filter);
        query::with_converted_params(&values, |params| self.many(&sql, params, rows::transfer))
    }

    fn insert_unit(&mut self, unit: &Unit) -> StoreResult<()> {
        self.write(
            "INSERT INTO units (id, name, total_price, created_at, updated_at, deleted_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
            &[
                &unit.id.0,
                &unit.name,
                &unit.total_price,
                &unit.created_at,
                &unit.updated_at,
                &unit.state.deleted_at(),
            ],
        )
    }

    fn get_unit(&mut self, id: UnitId) -> StoreResult<Option<Unit>> {
        self.by_id("units", rows::UNIT_COLUMNS, id.0, false, rows::unit)
    }

    fn lock_unit(&mut self, id: UnitId) -> StoreResult<Option<Unit>> {
        self.by_id("units", rows::UNIT_COLUMNS, id.0, true, rows::unit)
    }

    fn update_unit(&mut self, unit: &Unit) -> StoreResult<()> {
        self.update(
            "units",
            unit.id.0,
            "UPDATE units SET name = $2, total_price = $3, updated_at = $4, deleted_at = $5 WHERE id = $1",
            &[
                &unit.id.0,
                &unit.name,
                &unit.total_price,
                &unit.updated_at,
                &unit.state.deleted_at(),
            ],
        )
    }

    fn list_units(&mut self) -> StoreResult<Vec<Unit>> {
        let sql = self.active_named("units", rows::UNIT_COLUMNS);
        self.many(&sql, &[], rows::unit)
    }

    fn insert_partner(&mut self, partner: &Partner) -> StoreResult<()> {
        self.write(
            "INSERT INTO partners (id, name, phone, email, created_at, updated_at, deleted_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[
                &partner.id.0,
                &partner.name,
                &partner.phone,
                &partner.email,
                &partner.created_at,
                &partner.updated_at,
                &partner.state.deleted_at(),
            ],
        )
    }

    fn get_partner(&mut self, id: PartnerId) -> StoreResult<Option<Partner>> {
        self.by_id("partners", rows::PARTNER_COLUMNS, id.0, false, rows::partner)
    }

    fn update_partner(&mut self, partner: &Partner) -> StoreResult<()> {
        self.update(
            "partners",
            partner.id.0,
            "UPDATE partners SET name = $2, phone = $3, email = $4, updated_at = $5, deleted_at = $6 \
             WHERE id = $1",
            &[
                &partner.id.0,
                &partner.name,
                &partner.phone,
                &partner.email,
                &partner.updated_at,
                &partner.state.deleted_at(),
            ],
        )
    }

    fn list_partners(&mut self) -> StoreResult<Vec<Partner>> {
        let sql = self.active_named("partners", rows::PARTNER_COLUMNS);
        self.many(&sql, &[], rows::partner)
    }

    fn insert_group(&mut self, group: &PartnerGroup) -> StoreResult<()> {
        self.write(
            "INSERT INTO partner_groups (id, name, created_at, updated_at, deleted_at) \
             VALUES ($1, $2, $3, $4, $5)",
            &[
                &group.id.0,
                &group.name,
                &group.created_at,
                &group.updated_at,
                &group.state.deleted_at(),
            ],
        )
    }

    fn get_group(&mut self, id: GroupId) -> StoreResult<Option<PartnerGroup>> {
        self.by_id("partner_groups", rows::GROUP_COLUMNS, id.0, false, rows::group)
    }

    fn lock_group(&mut self, id: GroupId) -> StoreResult<Option<PartnerGroup>> {
        self.by_id("partner_groups", rows::GROUP_COLUMNS, id.0, true, rows::group)
    }

    fn list_groups(&mut self) -> StoreResult<Vec<PartnerGroup>> {
        let sql = self.active_named("partner_groups", rows::GROUP_COLUMNS);
        self.many(&sql, &[], rows::group)
    }

    fn insert_member(&mut self, member: &GroupMember) -> StoreResult<()> {
        self.write(
            "INSERT INTO partner_group_partners (id, group_id, partner_id, percentage, created_at, \
             updated_at, deleted_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[
                &member.id.0,
                &member.group_id.0,
                &member.partner_id.0,
                &member.percentage,
                &member.created_at,
                &member.updated_at,
                &member.state.deleted_at(),
            ],
        )
    }

    fn get_member(&mut self, id: MemberId) -> StoreResult<Option<GroupMember>> {
        self.by_id("partner_group_partners", rows::MEMBER_COLUMNS, id.0, false, rows::member)
    }

    fn update_member(&mut self, member: &GroupMember) -> StoreResult<()> {
        self.update(
            "partner_group_partners",
            member.id.0,
            "UPDATE partner_group_partners SET percentage = $2, updated_at = $3, deleted_at = $4 \
             WHERE id = $1",
            &[
                &member.id.0,
                &member.percentage,
                &member.updated_at,
                &member.state.deleted_at(),
            ],
        )
    }

    fn active_members_of_group(&mut self, group: GroupId) -> StoreResult<Vec<GroupMember>> {
        let sql = self.active_by("partner_group_partners", rows::MEMBER_COLUMNS, "group_id");
        self.many(&sql, &[&group.0], rows::member)
    }

    fn active_memberships_of_partner(&mut self, partner: PartnerId) -> StoreResult<Vec<GroupMember>> {
        let sql = self.active_by("partner_group_partners", rows::MEMBER_COLUMNS, "partner_id");
        self.many(&sql, &[&partner.0], rows::member)
    }

    fn insert_unit_partner(&mut self, link: &UnitPartner) -> StoreResult<()> {
        self.write(
            "INSERT INTO unit_partners (id, unit_id, partner_id, percentage, created_at, updated_at, \
             deleted_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[
                &link.id.0,
                &link.unit_id.0,
                &link.partner_id.0,
                &link.percentage,
                &link.created_at,
                &link.updated_at,
                &link.state.deleted_at(),
            ],
        )
    }

    fn get_unit_partner(&mut self, id: UnitPartnerId) -> StoreResult<Option<UnitPartner>> {
        self.by_id("unit_partners", rows::UNIT_PARTNER_COLUMNS, id.0, false, rows::unit_partner)
    }

    fn update_unit_partner(&mut self, link: &UnitPartner) -> StoreResult<()> {
        self.update(
            "unit_partners",
            link.id.0,
            "UPDATE unit_partners SET percentage = $2, updated_at = $3, deleted_at = $4 WHERE id = $1",
            &[
                &link.id.0,
                &link.percentage,
                &link.updated_at,
                &link.state.deleted_at(),
            ],
        )
    }

    fn active_partners_of_unit(&mut self, unit: UnitId) -> StoreResult<Vec<UnitPartner>> {
        let sql = self.active_by("unit_partners", rows::UNIT_PARTNER_COLUMNS, "unit_id");
        self.many(&sql, &[&unit.0], rows::unit_partner)
    }

    fn active_units_of_partner(&mut self, partner: PartnerId) -> StoreResult<Vec<UnitPartner>> {
        let sql = self.active_by("unit_partners", rows::UNIT_PARTNER_COLUMNS, "partner_id");
        self.many(&sql, &[&partner.0], rows::unit_partner)
    }

    fn insert_unit_group(&mut self, link: &UnitGroupLink) -> StoreResult<()> {
        self.write(
            "INSERT INTO unit_partner_groups (id, unit_id, group_id, created_at, updated_at, deleted_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
            &[
                &link.id.0,
                &link.unit_id.0,
                &link.group_id.0,
                &link.created_at,
                &link.updated_at,
                &link.state.deleted_at(),
            ],
        )
    }

    fn get_unit_group(&mut self, id: UnitGroupId) -> StoreResult<Option<UnitGroupLink>> {
        self.by_id("unit_partner_groups", rows::UNIT_GROUP_COLUMNS, id.0, false, rows::unit_group)
    }

    fn update_unit_group(&mut self, link: &UnitGroupLink) -> StoreResult<()> {
        self.update(
            "unit_partner_groups",
            link.id.0,
            "UPDATE unit_partner_groups SET updated_at = $2, deleted_at = $3 WHERE id = $1",
            &[&link.id.0, &link.updated_at, &link.state.deleted_at()],
        )
    }

    fn active_groups_of_unit(&mut self, unit: UnitId) -> StoreResult<Vec<UnitGroupLink>> {
        let sql = self.active_by("unit_partner_groups", rows::UNIT_GROUP_COLUMNS, "unit_id");
        self.many(&sql, &[&unit.0], rows::unit_group)
    }

    fn active_units_of_group(&mut self, group: GroupId) -> StoreResult<Vec<UnitGroupLink>> {
        let sql = self.active_by("unit_partner_groups", rows::UNIT_GROUP_COLUMNS, "group_id");
        self.many(&sql, &[&group.0], rows::unit_group)
    }

    fn insert_broker(&mut self, broker: &Broker) -> StoreResult<()> {
        self.write(
            "INSERT INTO brokers (id, name, phone, created_at, updated_at, deleted_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
            &[
                &broker.id.0,
                &broker.name,
                &broker.phone,
                &broker.created_at,
                &broker.updated_at,
                &broker.state.deleted_at(),
            ],
        )
    }

    fn get_broker(&mut self, id: BrokerId) -> StoreResult<Option<Broker>> {
        self.by_id("brokers", rows::BROKER_COLUMNS, id.0, false, rows::broker)
    }

    fn update_broker(&mut self, broker: &Broker) -> StoreResult<()> {
        self.update(
            "brokers",
            broker.id.0,
            "UPDATE brokers SET name = $2, phone = $3, updated_at = $4, deleted_at = $5 WHERE id = $1",
            &[
                &broker.id.0,
                &broker.name,
                &broker.phone,
                &broker.updated_at,
                &broker.state.deleted_at(),
            ],
        )
    }

    fn list_brokers(&mut self) -> StoreResult<Vec<Broker>> {
        let sql = self.active_named("brokers", rows::BROKER_COLUMNS);
        self.many(&sql, &[], rows::broker)
    }

    fn insert_obligation(&mut self, obligation: &Obligation) -> StoreResult<()> {
        let (table, party_column) = rows::obligation_table(obligation.kind());
        let sql = format!(
            "INSERT INTO {table} (id, {party_column}, amount, due_date, notes, status, paid_at, \
             created_at, updated_at, deleted_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        );
        self.write(
            &sql,
            &[
                &obligation.id.0,
                &obligation.party.uuid(),
                &obligation.amount,
                &obligation.due_date,
                &obligation.notes,
                &obligation.status.as_str(),
                &obligation.paid_at,
                &obligation.created_at,
                &obligation.updated_at,
                &obligation.state.deleted_at(),
            ],
        )
    }

    fn get_obligation(&mut self, kind: ObligationKind, id: ObligationId) -> StoreResult<Option<Obligation>> {
        let (table, _) = rows::obligation_table(kind);
        let columns = rows::obligation_columns(kind);
        self.by_id(table, &columns, id.0, false, |row| rows::obligation(kind, row))
    }

    fn lock_obligation(&mut self, kind: ObligationKind, id: ObligationId) -> StoreResult<Option<Obligation>> {
        let (table, _) = rows::obligation_table(kind);
        let columns = rows::obligation_columns(kind);
        self.by_id(table, &columns, id.0, true, |row| rows::obligation(kind, row))
    }

    fn update_obligation(&mut self, obligation: &Obligation) -> StoreResult<()> {
        let (table, _) = rows::obligation_table(obligation.kind());
        let sql = format!(
            "UPDATE {table} SET amount = $2, due_date = $3, notes = $4, status = $5, paid_at = $6, \
             updated_at = $7, deleted_at = $8 WHERE id = $1"
        );
        self.update(
            table,
            obligation.id.0,
            &sql,
            &[
                &obligation.id.0,
                &obligation.amount,
                &obligation.due_date,
                &obligation.notes,
                &obligation.status.as_str(),
                &obligation.paid_at,
                &obligation.updated_at,
                &obligation.state.deleted_at(),
            ],
        )
    }

    fn find_obligations(
        &mut self,
        kind: ObligationKind,
        filter: &ObligationFilter,
    ) -> StoreResult<Vec<Obligation>> {
        let (sql, values) = query::obligations(kind, filter);
        query::with_converted_params(&values, |params| {
            self.many(&sql, params, |row| rows::obligation(kind, row))
        })
    }
}
