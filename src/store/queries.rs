use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, ToSql, params};

use crate::config::BusinessUnitSeed;
use crate::model::{
    BusinessUnitTotals, ExpiringPurchaseOrder, PoStatus, PurchaseOrderFilter,
    PurchaseOrderSummary, StatusChange, StatusHistoryEntry, StoreTotals, cents_to_decimal,
};
use crate::util::now_utc_string;

impl ToSql for PoStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for PoStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        PoStatus::parse(text)
            .ok_or_else(|| FromSqlError::Other(format!("unknown purchase-order status: {text}").into()))
    }
}

#[derive(Debug)]
pub struct NewPurchaseOrder<'a> {
    pub po_number: &'a str,
    pub business_unit_id: i64,
    pub client_id: i64,
    pub value_cents: i64,
    pub currency: &'a str,
    pub issue_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub status: PoStatus,
    pub description: Option<&'a str>,
    pub source_file: &'a str,
    pub created_at: &'a str,
}

#[derive(Debug)]
pub enum StatusUpdate {
    NotFound,
    Unchanged(PoStatus),
    Changed(StatusChange),
}

/// Inserts the business unit unless its code is already present.
/// Existing rows are reference data and are left untouched.
pub fn seed_business_unit(
    connection: &Connection,
    seed: &BusinessUnitSeed,
    created_at: &str,
) -> rusqlite::Result<bool> {
    let inserted = connection.execute(
        "
        INSERT INTO business_units(code, name, managers, location, created_at)
        VALUES(?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(code) DO NOTHING
        ",
        params![
            seed.code.trim(),
            seed.name.trim(),
            seed.managers.join("; "),
            seed.location.trim(),
            created_at
        ],
    )?;
    Ok(inserted > 0)
}

pub fn business_unit_id(connection: &Connection, code: &str) -> rusqlite::Result<Option<i64>> {
    connection
        .query_row(
            "SELECT id FROM business_units WHERE code = ?1",
            [code],
            |row| row.get(0),
        )
        .optional()
}

/// Returns the client id for a normalized name and whether the row was created.
pub fn get_or_create_client(
    connection: &Connection,
    name: &str,
    created_at: &str,
) -> rusqlite::Result<(i64, bool)> {
    let inserted = connection.execute(
        "INSERT INTO client_organizations(name, created_at) VALUES(?1, ?2)
         ON CONFLICT(name) DO NOTHING",
        params![name, created_at],
    )?;
    let id = connection.query_row(
        "SELECT id FROM client_organizations WHERE name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok((id, inserted > 0))
}

pub fn insert_purchase_order(
    connection: &Connection,
    order: &NewPurchaseOrder<'_>,
) -> rusqlite::Result<i64> {
    connection.execute(
        "
        INSERT INTO purchase_orders(
          po_number, business_unit_id, client_id, value_cents, currency,
          issue_date, expiry_date, status, description, source_file,
          created_at, updated_at
        )
        VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
        ",
        params![
            order.po_number,
            order.business_unit_id,
            order.client_id,
            order.value_cents,
            order.currency,
            order.issue_date,
            order.expiry_date,
            order.status,
            order.description,
            order.source_file,
            order.created_at
        ],
    )?;
    Ok(connection.last_insert_rowid())
}

pub fn append_status_history(
    connection: &Connection,
    purchase_order_id: i64,
    old_status: Option<PoStatus>,
    new_status: PoStatus,
    changed_at: &str,
    note: Option<&str>,
) -> rusqlite::Result<i64> {
    connection.execute(
        "
        INSERT INTO status_history(purchase_order_id, old_status, new_status, changed_at, note)
        VALUES(?1, ?2, ?3, ?4, ?5)
        ",
        params![purchase_order_id, old_status, new_status, changed_at, note],
    )?;
    Ok(connection.last_insert_rowid())
}

pub fn existing_po_numbers(connection: &Connection) -> Result<Vec<String>> {
    let mut statement = connection.prepare("SELECT po_number FROM purchase_orders")?;
    let numbers = statement
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()
        .context("failed to load existing purchase-order numbers")?;
    Ok(numbers)
}

pub fn business_unit_totals(connection: &Connection) -> Result<Vec<BusinessUnitTotals>> {
    let mut statement = connection.prepare(
        "
        SELECT bu.code, bu.name, COUNT(po.id), COALESCE(SUM(po.value_cents), 0) AS total_cents
        FROM business_units bu
        LEFT JOIN purchase_orders po ON po.business_unit_id = bu.id
        GROUP BY bu.id, bu.code, bu.name
        ORDER BY total_cents DESC, bu.code ASC
        ",
    )?;

    let totals = statement
        .query_map([], |row| {
            Ok(BusinessUnitTotals {
                code: row.get(0)?,
                name: row.get(1)?,
                po_count: row.get(2)?,
                total_value: cents_to_decimal(row.get(3)?),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to summarize business units")?;
    Ok(totals)
}

pub fn store_totals(connection: &Connection) -> Result<StoreTotals> {
    let totals = connection
        .query_row(
            "
            SELECT
              COUNT(*),
              COALESCE(SUM(value_cents), 0),
              COUNT(CASE WHEN status = 'active' THEN 1 END),
              COUNT(CASE WHEN status = 'completed' THEN 1 END),
              COUNT(CASE WHEN status = 'cancelled' THEN 1 END),
              COUNT(DISTINCT client_id)
            FROM purchase_orders
            ",
            [],
            |row| {
                Ok(StoreTotals {
                    po_count: row.get(0)?,
                    total_value: cents_to_decimal(row.get(1)?),
                    active: row.get(2)?,
                    completed: row.get(3)?,
                    cancelled: row.get(4)?,
                    client_count: row.get(5)?,
                })
            },
        )
        .context("failed to summarize purchase orders")?;
    Ok(totals)
}

/// Active purchase orders whose expiry falls within `days_ahead` days of `today`.
pub fn expiring_purchase_orders(
    connection: &Connection,
    today: NaiveDate,
    days_ahead: u64,
) -> Result<Vec<ExpiringPurchaseOrder>> {
    let horizon = today.checked_add_days(Days::new(days_ahead)).unwrap_or(NaiveDate::MAX);

    let mut statement = connection.prepare(
        "
        SELECT po.po_number, bu.code, c.name, po.value_cents, po.expiry_date
        FROM purchase_orders po
        JOIN business_units bu ON bu.id = po.business_unit_id
        JOIN client_organizations c ON c.id = po.client_id
        WHERE po.status = 'active'
          AND po.expiry_date >= ?1
          AND po.expiry_date <= ?2
        ORDER BY po.expiry_date ASC, po.po_number ASC
        ",
    )?;

    let orders = statement
        .query_map(params![today, horizon], |row| {
            let expiry_date: NaiveDate = row.get(4)?;
            Ok(ExpiringPurchaseOrder {
                po_number: row.get(0)?,
                business_unit: row.get(1)?,
                client: row.get(2)?,
                value: cents_to_decimal(row.get(3)?),
                expiry_date,
                days_remaining: (expiry_date - today).num_days(),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to query expiring purchase orders")?;
    Ok(orders)
}

/// Purchase orders matching every set filter field, newest issue date first.
pub fn list_purchase_orders(
    connection: &Connection,
    filter: &PurchaseOrderFilter,
) -> Result<Vec<PurchaseOrderSummary>> {
    let mut statement = connection.prepare(
        "
        SELECT po.po_number, bu.code, c.name, po.value_cents, po.currency,
               po.issue_date, po.expiry_date, po.status
        FROM purchase_orders po
        JOIN business_units bu ON bu.id = po.business_unit_id
        JOIN client_organizations c ON c.id = po.client_id
        WHERE (?1 IS NULL OR bu.code = ?1)
          AND (?2 IS NULL OR po.status = ?2)
          AND (?3 IS NULL OR po.issue_date >= ?3)
          AND (?4 IS NULL OR po.issue_date <= ?4)
        ORDER BY po.issue_date DESC, po.po_number ASC
        ",
    )?;

    let orders = statement
        .query_map(
            params![
                filter.business_unit,
                filter.status,
                filter.issued_from,
                filter.issued_to
            ],
            |row| {
                Ok(PurchaseOrderSummary {
                    po_number: row.get(0)?,
                    business_unit: row.get(1)?,
                    client: row.get(2)?,
                    value: cents_to_decimal(row.get(3)?),
                    currency: row.get(4)?,
                    issue_date: row.get(5)?,
                    expiry_date: row.get(6)?,
                    status: row.get(7)?,
                })
            },
        )?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to list purchase orders")?;
    Ok(orders)
}

/// Sets a purchase order's status and appends the matching history row in
/// one transaction. Setting the current status again records nothing.
pub fn update_status(
    connection: &mut Connection,
    po_number: &str,
    new_status: PoStatus,
    note: Option<&str>,
) -> Result<StatusUpdate> {
    let tx = connection.transaction()?;

    let current: Option<(i64, PoStatus)> = tx
        .query_row(
            "SELECT id, status FROM purchase_orders WHERE po_number = ?1",
            [po_number],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .with_context(|| format!("failed to look up purchase order {po_number}"))?;

    let Some((purchase_order_id, old_status)) = current else {
        return Ok(StatusUpdate::NotFound);
    };
    if old_status == new_status {
        return Ok(StatusUpdate::Unchanged(old_status));
    }

    let now = now_utc_string();
    tx.execute(
        "UPDATE purchase_orders SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![new_status, now, purchase_order_id],
    )
    .with_context(|| format!("failed to update status of {po_number}"))?;
    append_status_history(
        &tx,
        purchase_order_id,
        Some(old_status),
        new_status,
        &now,
        note,
    )
    .with_context(|| format!("failed to record status history for {po_number}"))?;
    tx.commit()?;

    Ok(StatusUpdate::Changed(StatusChange {
        po_number: po_number.to_string(),
        old_status,
        new_status,
    }))
}

/// History entries oldest first, or `None` when the purchase order is unknown.
pub fn status_history(
    connection: &Connection,
    po_number: &str,
) -> Result<Option<Vec<StatusHistoryEntry>>> {
    let purchase_order_id: Option<i64> = connection
        .query_row(
            "SELECT id FROM purchase_orders WHERE po_number = ?1",
            [po_number],
            |row| row.get(0),
        )
        .optional()?;
    let Some(purchase_order_id) = purchase_order_id else {
        return Ok(None);
    };

    let mut statement = connection.prepare(
        "
        SELECT id, old_status, new_status, changed_at, note
        FROM status_history
        WHERE purchase_order_id = ?1
        ORDER BY id ASC
        ",
    )?;
    let entries = statement
        .query_map([purchase_order_id], |row| {
            Ok(StatusHistoryEntry {
                id: row.get(0)?,
                old_status: row.get(1)?,
                new_status: row.get(2)?,
                changed_at: row.get(3)?,
                note: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .with_context(|| format!("failed to read status history for {po_number}"))?;
    Ok(Some(entries))
}
