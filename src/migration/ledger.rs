//! Ledger schema.
//!
//! Every table carries `created_at`, `updated_at` and a nullable `deleted_at`. Amounts
//! are `NUMERIC(19,4)`. Partial unique indexes keep at most one active row per link.

use super::migration::{Migration, SqlMigration};

pub(super) fn migrations() -> Vec<Box<dyn Migration>> {
    vec![
        Box::new(CREATE_SAFES_AND_MOVEMENTS),
        Box::new(CREATE_OWNERSHIP),
        Box::new(CREATE_OBLIGATIONS),
    ]
}

const CREATE_SAFES_AND_MOVEMENTS: SqlMigration = SqlMigration {
    version: 20240301090000,
    name: "create_safes_and_movements",
    up: &[
        r#"
        CREATE TABLE safes (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            opening_balance NUMERIC(19,4) NOT NULL DEFAULT 0 CHECK (opening_balance >= 0),
            balance NUMERIC(19,4) NOT NULL CHECK (balance >= 0),
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            deleted_at TIMESTAMPTZ
        )
        "#,
        r#"
        CREATE TABLE vouchers (
            id UUID PRIMARY KEY,
            kind VARCHAR(16) NOT NULL CHECK (kind IN ('receipt', 'payment')),
            date DATE NOT NULL,
            amount NUMERIC(19,4) NOT NULL CHECK (amount > 0),
            safe_id UUID NOT NULL REFERENCES safes(id) ON DELETE RESTRICT,
            description TEXT NOT NULL,
            payer VARCHAR(255),
            beneficiary VARCHAR(255),
            link_type VARCHAR(16) CHECK (link_type IN ('unit', 'contract')),
            link_id UUID,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            deleted_at TIMESTAMPTZ,
            CHECK ((link_type IS NULL) = (link_id IS NULL))
        )
        "#,
        "CREATE INDEX idx_vouchers_safe_date ON vouchers(safe_id, date) WHERE deleted_at IS NULL",
        "CREATE INDEX idx_vouchers_link ON vouchers(link_type, link_id) WHERE deleted_at IS NULL",
        r#"
        CREATE TABLE transfers (
            id UUID PRIMARY KEY,
            from_safe_id UUID NOT NULL REFERENCES safes(id) ON DELETE RESTRICT,
            to_safe_id UUID NOT NULL REFERENCES safes(id) ON DELETE RESTRICT,
            amount NUMERIC(19,4) NOT NULL CHECK (amount > 0),
            date DATE NOT NULL,
            description TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            deleted_at TIMESTAMPTZ,
            CHECK (from_safe_id <> to_safe_id)
        )
        "#,
        "CREATE INDEX idx_transfers_from ON transfers(from_safe_id) WHERE deleted_at IS NULL",
        "CREATE INDEX idx_transfers_to ON transfers(to_safe_id) WHERE deleted_at IS NULL",
    ],
    down: &[
        "DROP TABLE IF EXISTS transfers",
        "DROP TABLE IF EXISTS vouchers",
        "DROP TABLE IF EXISTS safes",
    ],
};

const CREATE_OWNERSHIP: SqlMigration = SqlMigration {
    version: 20240301090100,
    name: "create_ownership",
    up: &[
        r#"
        CREATE TABLE units (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            total_price NUMERIC(19,4) NOT NULL CHECK (total_price >= 0),
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            deleted_at TIMESTAMPTZ
        )
        "#,
        r#"
        CREATE TABLE partners (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            phone VARCHAR(64),
            email VARCHAR(255),
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            deleted_at TIMESTAMPTZ
        )
        "#,
        r#"
        CREATE TABLE partner_groups (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            deleted_at TIMESTAMPTZ
        )
        "#,
        r#"
        CREATE TABLE partner_group_partners (
            id UUID PRIMARY KEY,
            group_id UUID NOT NULL REFERENCES partner_groups(id) ON DELETE RESTRICT,
            partner_id UUID NOT NULL REFERENCES partners(id) ON DELETE RESTRICT,
            percentage NUMERIC(7,4) NOT NULL CHECK (percentage > 0 AND percentage <= 100),
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            deleted_at TIMESTAMPTZ
        )
        "#,
        "CREATE UNIQUE INDEX uq_group_partner_active ON partner_group_partners(group_id, partner_id) \
         WHERE deleted_at IS NULL",
        r#"
        CREATE TABLE unit_partners (
            id UUID PRIMARY KEY,
            unit_id UUID NOT NULL REFERENCES units(id) ON DELETE RESTRICT,
            partner_id UUID NOT NULL REFERENCES partners(id) ON DELETE RESTRICT,
            percentage NUMERIC(7,4) NOT NULL CHECK (percentage > 0 AND percentage <= 100),
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            deleted_at TIMESTAMPTZ
        )
        "#,
        "CREATE UNIQUE INDEX uq_unit_partner_active ON unit_partners(unit_id, partner_id) \
         WHERE deleted_at IS NULL",
        "CREATE INDEX idx_unit_partners_partner ON unit_partners(partner_id) WHERE deleted_at IS NULL",
        r#"
        CREATE TABLE unit_partner_groups (
            id UUID PRIMARY KEY,
            unit_id UUID NOT NULL REFERENCES units(id) ON DELETE RESTRICT,
            group_id UUID NOT NULL REFERENCES partner_groups(id) ON DELETE RESTRICT,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            deleted_at TIMESTAMPTZ
        )
        "#,
        "CREATE UNIQUE INDEX uq_unit_group_active ON unit_partner_groups(unit_id, group_id) \
         WHERE deleted_at IS NULL",
    ],
    down: &[
        "DROP TABLE IF EXISTS unit_partner_groups",
        "DROP TABLE IF EXISTS unit_partners",
        "DROP TABLE IF EXISTS partner_group_partners",
        "DROP TABLE IF EXISTS partner_groups",
        "DROP TABLE IF EXISTS partners",
        "DROP TABLE IF EXISTS units",
    ],
};

const CREATE_OBLIGATIONS: SqlMigration = SqlMigration {
    version: 20240301090200,
    name: "create_obligations",
    up: &[
        r#"
        CREATE TABLE brokers (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            phone VARCHAR(64),
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            deleted_at TIMESTAMPTZ
        )
        "#,
        r#"
        CREATE TABLE broker_dues (
            id UUID PRIMARY KEY,
            broker_id UUID NOT NULL REFERENCES brokers(id) ON DELETE RESTRICT,
            amount NUMERIC(19,4) NOT NULL CHECK (amount > 0),
            due_date DATE NOT NULL,
            notes TEXT,
            status VARCHAR(16) NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'paid')),
            paid_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            deleted_at TIMESTAMPTZ
        )
        "#,
        "CREATE INDEX idx_broker_dues_due ON broker_dues(status, due_date) WHERE deleted_at IS NULL",
        r#"
        CREATE TABLE partner_debts (
            id UUID PRIMARY KEY,
            partner_id UUID NOT NULL REFERENCES partners(id) ON DELETE RESTRICT,
            amount NUMERIC(19,4) NOT NULL CHECK (amount > 0),
            due_date DATE NOT NULL,
            notes TEXT,
            status VARCHAR(16) NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'paid')),
            paid_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            deleted_at TIMESTAMPTZ
        )
        "#,
        "CREATE INDEX idx_partner_debts_due ON partner_debts(status, due_date) WHERE deleted_at IS NULL",
    ],
    down: &[
        "DROP TABLE IF EXISTS partner_debts",
        "DROP TABLE IF EXISTS broker_dues",
        "DROP TABLE IF EXISTS brokers",
    ],
};
