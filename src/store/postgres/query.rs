//! Filtered list queries.
//!
//! List filters are optional in every field, so their SQL is assembled with `sea-query`
//! and the resulting [`Values`] are bound through [`with_converted_params`].

use super::rows::{self, obligation_table};
use crate::error::StoreError;
use crate::executor::DbError;
use crate::filter::{ObligationFilter, TransferFilter, VoucherFilter};
use crate::model::ObligationKind;
use chrono::{DateTime, NaiveDate, Utc};
use may_postgres::types::ToSql;
use rust_decimal::Decimal;
use sea_query::{
    Alias, Cond, Condition, Expr, ExprTrait, Order, PostgresQueryBuilder, Query, SelectStatement,
    Value, Values,
};
use uuid::Uuid;

fn col(name: &str) -> Expr {
    Expr::col(Alias::new(name))
}

fn select_from(table: &str, columns: &str) -> SelectStatement {
    Query::select()
        .expr(Expr::cust(columns.to_string()))
        .from(Alias::new(table))
        .to_owned()
}

/// `ILIKE` pattern matching `term` anywhere, with LIKE metacharacters escaped.
fn contains_pattern(term: &str) -> String {
    let escaped = term
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn active_only(cond: Condition, include_deleted: bool) -> Condition {
    if include_deleted {
        cond
    } else {
        cond.add(col("deleted_at").is_null())
    }
}

fn range<T>(cond: Condition, column: &str, low: Option<T>, high: Option<T>) -> Condition
where
    T: Into<Value>,
{
    let cond = match low {
        Some(low) => {
            let low: Value = low.into();
            cond.add(col(column).gte(low))
        }
        None => cond,
    };
    match high {
        Some(high) => {
            let high: Value = high.into();
            cond.add(col(column).lte(high))
        }
        None => cond,
    }
}

pub(super) fn vouchers(filter: &VoucherFilter) -> (String, Values) {
    let mut cond = active_only(Cond::all(), filter.include_deleted);
    if let Some(safe) = filter.safe_id {
        cond = cond.add(col("safe_id").eq(safe.0));
    }
    if let Some(kind) = filter.kind {
        cond = cond.add(col("kind").eq(kind.as_str()));
    }
    if let Some(link) = filter.linked {
        let (link_type, link_id) = link.to_columns();
        cond = cond
            .add(col("link_type").eq(link_type))
            .add(col("link_id").eq(link_id));
    }
    cond = range(cond, "amount", filter.amount_min, filter.amount_max);
    cond = range(cond, "date", filter.date_from, filter.date_to);
    if let Some(term) = &filter.search {
        let pattern = contains_pattern(term);
        cond = cond.add(Expr::cust_with_values(
            "(description ILIKE ? OR payer ILIKE ? OR beneficiary ILIKE ?)",
            [pattern.clone(), pattern.clone(), pattern],
        ));
    }

    select_from("vouchers", rows::VOUCHER_COLUMNS)
        .cond_where(cond)
        .order_by(Alias::new("date"), Order::Asc)
        .order_by(Alias::new("created_at"), Order::Asc)
        .order_by(Alias::new("id"), Order::Asc)
        .build(PostgresQueryBuilder)
}

pub(super) fn transfers(filter: &TransferFilter) -> (String, Values) {
    let mut cond = active_only(Cond::all(), filter.include_deleted);
    if let Some(safe) = filter.from_safe {
        cond = cond.add(col("from_safe_id").eq(safe.0));
    }
    if let Some(safe) = filter.to_safe {
        cond = cond.add(col("to_safe_id").eq(safe.0));
    }
    if let Some(safe) = filter.involving_safe {
        cond = cond.add(
            Cond::any()
                .add(col("from_safe_id").eq(safe.0))
                .add(col("to_safe_id").eq(safe.0)),
        );
    }
    cond = range(cond, "amount", filter.amount_min, filter.amount_max);
    cond = range(cond, "date", filter.date_from, filter.date_to);
    if let Some(term) = &filter.search {
        cond = cond.add(Expr::cust_with_values(
            "description ILIKE ?",
            [contains_pattern(term)],
        ));
    }

    select_from("transfers", rows::TRANSFER_COLUMNS)
        .cond_where(cond)
        .order_by(Alias::new("date"), Order::Asc)
        .order_by(Alias::new("created_at"), Order::Asc)
        .order_by(Alias::new("id"), Order::Asc)
        .build(PostgresQueryBuilder)
}

pub(super) fn obligations(kind: ObligationKind, filter: &ObligationFilter) -> (String, Values) {
    let (table, party_column) = obligation_table(kind);
    let mut cond = active_only(Cond::all(), filter.include_deleted);
    if let Some(party) = filter.party {
        if party.kind() == kind {
            cond = cond.add(col(party_column).eq(party.uuid()));
        } else {
            // A broker never owns a partner debt and vice versa.
            cond = cond.add(Expr::cust("FALSE"));
        }
    }
    if let Some(status) = filter.status {
        cond = cond.add(col("status").eq(status.as_str()));
    }
    cond = range(cond, "due_date", filter.due_from, filter.due_to);

    select_from(table, &rows::obligation_columns(kind))
        .cond_where(cond)
        .order_by(Alias::new("due_date"), Order::Asc)
        .order_by(Alias::new("created_at"), Order::Asc)
        .order_by(Alias::new("id"), Order::Asc)
        .build(PostgresQueryBuilder)
}

/// Owned form of one bound value.
enum Param {
    Bool(Option<bool>),
    BigInt(Option<i64>),
    Text(Option<String>),
    Uuid(Option<Uuid>),
    Decimal(Option<Decimal>),
    Date(Option<NaiveDate>),
    Timestamp(Option<DateTime<Utc>>),
}

impl Param {
    fn as_sql(&self) -> &dyn ToSql {
        match self {
            Param::Bool(v) => v,
            Param::BigInt(v) => v,
            Param::Text(v) => v,
            Param::Uuid(v) => v,
            Param::Decimal(v) => v,
            Param::Date(v) => v,
            Param::Timestamp(v) => v,
        }
    }
}

fn convert(value: &Value) -> Result<Param, StoreError> {
    // Some sea-query builds box the larger payloads; the annotated bindings deref-coerce
    // either shape to a plain reference.
    let param = match value {
        Value::Bool(v) => Param::Bool(*v),
        Value::Int(v) => Param::BigInt(v.map(i64::from)),
        Value::BigInt(v) => Param::BigInt(*v),
        Value::String(v) => Param::Text(v.as_ref().map(|s| {
            let s: &String = s;
            s.clone()
        })),
        Value::Uuid(v) => Param::Uuid(v.as_ref().map(|u| {
            let u: &Uuid = u;
            *u
        })),
        Value::Decimal(v) => Param::Decimal(v.as_ref().map(|d| {
            let d: &Decimal = d;
            *d
        })),
        Value::ChronoDate(v) => Param::Date(v.as_ref().map(|d| {
            let d: &NaiveDate = d;
            *d
        })),
        Value::ChronoDateTimeUtc(v) => Param::Timestamp(v.as_ref().map(|t| {
            let t: &DateTime<Utc> = t;
            *t
        })),
        other => {
            return Err(DbError::Query(format!("unsupported value type in query: {other:?}")).into())
        }
    };
    Ok(param)
}

/// Convert sea-query values to `ToSql` parameters and pass them to `f`.
pub(super) fn with_converted_params<R>(
    values: &Values,
    f: impl FnOnce(&[&dyn ToSql]) -> Result<R, StoreError>,
) -> Result<R, StoreError> {
    let owned = values
        .iter()
        .map(convert)
        .collect::<Result<Vec<_>, _>>()?;
    let params: Vec<&dyn ToSql> = owned.iter().map(Param::as_sql).collect();
    f(&params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ObligationStatus, Party, PartnerId, SafeId, VoucherKind};

    #[test]
    fn test_default_voucher_filter_hides_deleted() {
        let (sql, values) = vouchers(&VoucherFilter::default());
        assert!(sql.contains(r#""deleted_at" IS NULL"#), "{sql}");
        assert!(sql.contains("ORDER BY"));
        assert_eq!(values.iter().count(), 0);
    }

    #[test]
    fn test_voucher_filter_binds_every_constraint() {
        let filter = VoucherFilter {
            safe_id: Some(SafeId::new()),
            kind: Some(VoucherKind::Payment),
            amount_min: Some(Decimal::from(5)),
            date_to: NaiveDate::from_ymd_opt(2024, 12, 31),
            search: Some("50%_off".to_string()),
            include_deleted: true,
            ..VoucherFilter::default()
        };
        let (sql, values) = vouchers(&filter);
        assert!(!sql.contains("deleted_at\" IS NULL"), "{sql}");
        assert!(sql.contains("ILIKE"));
        let bound: Vec<_> = values.iter().collect();
        assert_eq!(bound.len(), 7);
        assert!(bound
            .iter()
            .any(|v| matches!(v, Value::String(Some(s)) if s.as_str() == "%50\\%\\_off%")));
    }

    #[test]
    fn test_transfer_involving_uses_either_endpoint() {
        let (sql, _) = transfers(&TransferFilter::involving(SafeId::new()));
        assert!(sql.contains(r#""from_safe_id" = $1 OR "to_safe_id" = $2"#), "{sql}");
    }

    #[test]
    fn test_obligation_filter_for_other_party_kind_matches_nothing() {
        let filter = ObligationFilter {
            party: Some(Party::Partner(PartnerId::new())),
            status: Some(ObligationStatus::Pending),
            ..ObligationFilter::default()
        };
        let (sql, _) = obligations(ObligationKind::BrokerDue, &filter);
        assert!(sql.contains("FALSE"));
        assert!(sql.contains("broker_dues"));
    }

    #[test]
    fn test_converted_params_keep_order() {
        let (_, values) = obligations(ObligationKind::PartnerDebt, &ObligationFilter::pending());
        let count = with_converted_params(&values, |params| Ok(params.len())).unwrap();
        assert_eq!(count, 1);
    }
}
