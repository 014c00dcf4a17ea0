use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use tracing::debug;

use crate::util::{ensure_directory, now_utc_string};

mod queries;

pub use queries::*;

pub const DB_SCHEMA_VERSION: &str = "1.0.0";

/// Opens (creating if needed) the store and brings its schema up to date.
pub fn open_store(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        ensure_directory(parent)?;
    }

    let connection =
        Connection::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    configure_connection(&connection)?;
    ensure_schema(&connection)
        .with_context(|| format!("failed to initialize schema in {}", path.display()))?;

    debug!(path = %path.display(), "store opened");
    Ok(connection)
}

pub fn open_existing_store(path: &Path) -> Result<Connection> {
    if !path.exists() {
        bail!("store not found: {} (run `migrate` first)", path.display());
    }
    open_store(path)
}

/// Opens an existing store without touching it: no schema setup and no
/// metadata upserts. Used by commands that only read.
pub fn open_store_read_only(path: &Path) -> Result<Connection> {
    if !path.exists() {
        bail!("store not found: {} (run `migrate` first)", path.display());
    }

    let connection = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("failed to open store read-only: {}", path.display()))?;

    let version: Option<String> = connection
        .query_row(
            "SELECT value FROM metadata WHERE key = 'db_schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("failed to read schema version from {}", path.display()))?;
    match version.as_deref() {
        Some(DB_SCHEMA_VERSION) => {}
        Some(other) => bail!(
            "store {} has schema version {other}, expected {DB_SCHEMA_VERSION}",
            path.display()
        ),
        None => bail!("store {} has no schema version", path.display()),
    }

    debug!(path = %path.display(), "store opened read-only");
    Ok(connection)
}

pub(crate) fn configure_connection(connection: &Connection) -> Result<()> {
    // Rollback journal keeps the store a single file, which is what snapshots copy.
    connection
        .pragma_update(None, "journal_mode", "DELETE")
        .context("failed to set journal_mode=DELETE")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign_keys")?;
    Ok(())
}

pub(crate) fn ensure_schema(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS business_units (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          code TEXT NOT NULL UNIQUE,
          name TEXT NOT NULL,
          managers TEXT NOT NULL DEFAULT '',
          location TEXT NOT NULL DEFAULT '',
          created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS client_organizations (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          name TEXT NOT NULL UNIQUE,
          created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS purchase_orders (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          po_number TEXT NOT NULL UNIQUE,
          business_unit_id INTEGER NOT NULL,
          client_id INTEGER NOT NULL,
          value_cents INTEGER NOT NULL CHECK (value_cents > 0),
          currency TEXT NOT NULL,
          issue_date TEXT NOT NULL,
          expiry_date TEXT NOT NULL,
          status TEXT NOT NULL CHECK (status IN ('active', 'completed', 'cancelled')),
          description TEXT,
          source_file TEXT,
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL,
          CHECK (issue_date <= expiry_date),
          FOREIGN KEY(business_unit_id) REFERENCES business_units(id),
          FOREIGN KEY(client_id) REFERENCES client_organizations(id)
        );

        CREATE TABLE IF NOT EXISTS status_history (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          purchase_order_id INTEGER NOT NULL,
          old_status TEXT,
          new_status TEXT NOT NULL,
          changed_at TEXT NOT NULL,
          note TEXT,
          FOREIGN KEY(purchase_order_id) REFERENCES purchase_orders(id)
        );

        CREATE TRIGGER IF NOT EXISTS status_history_no_update
        BEFORE UPDATE ON status_history
        BEGIN
          SELECT RAISE(ABORT, 'status_history is append-only');
        END;

        CREATE TRIGGER IF NOT EXISTS status_history_no_delete
        BEFORE DELETE ON status_history
        BEGIN
          SELECT RAISE(ABORT, 'status_history is append-only');
        END;

        CREATE INDEX IF NOT EXISTS idx_po_business_unit ON purchase_orders(business_unit_id);
        CREATE INDEX IF NOT EXISTS idx_po_client ON purchase_orders(client_id);
        CREATE INDEX IF NOT EXISTS idx_po_status ON purchase_orders(status);
        CREATE INDEX IF NOT EXISTS idx_po_dates ON purchase_orders(issue_date, expiry_date);
        CREATE INDEX IF NOT EXISTS idx_history_po ON status_history(purchase_order_id);
        ",
    )?;

    let now = now_utc_string();
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now],
    )?;

    Ok(())
}

pub fn count_rows(connection: &Connection, sql: &str) -> Result<i64> {
    let count = connection
        .query_row(sql, [], |row| row.get(0))
        .with_context(|| format!("failed to count rows: {sql}"))?;
    Ok(count)
}
