use std::cell::Cell;

use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

/// Tables every database has from the start.
pub const BASE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tooling (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pn TEXT NOT NULL,
    supplier TEXT NOT NULL,
    pn_description TEXT NOT NULL DEFAULT '',
    tool_description TEXT NOT NULL DEFAULT '',
    tooling_life_qty REAL NOT NULL DEFAULT 0,
    produced REAL NOT NULL DEFAULT 0,
    remaining_tooling_life_pcs REAL NOT NULL DEFAULT 0,
    percent_tooling_life REAL NOT NULL DEFAULT 0,
    annual_volume_forecast REAL,
    date_annual_volume TEXT,
    date_remaining_tooling_life TEXT,
    status TEXT NOT NULL DEFAULT '',
    comments TEXT NOT NULL DEFAULT '[]',
    last_update TEXT
);
CREATE INDEX IF NOT EXISTS idx_tooling_supplier ON tooling (supplier);
CREATE TABLE IF NOT EXISTS supplier_metadata (
    supplier TEXT PRIMARY KEY,
    last_import TEXT
);
";

/// Columns added after the first release, with their definitions.
pub const OPTIONAL_COLUMNS: &[(&str, &str)] = &[
    ("expiration_date", "TEXT"),
    ("replacement_tooling_id", "INTEGER"),
];

/// Migration bookkeeping for one store, owned by whoever composes it.
#[derive(Debug, Default)]
pub struct SchemaState {
    columns_ensured: Cell<bool>,
    repair_attempted: Cell<bool>,
}

impl SchemaState {
    pub fn columns_ensured(&self) -> bool {
        self.columns_ensured.get()
    }

    /// Claims the single repair allowed per store; false once used.
    pub(crate) fn claim_repair(&self) -> bool {
        !self.repair_attempted.replace(true)
    }

    /// Adds missing optional columns. Safe to call any number of times.
    pub fn ensure_columns(&self, conn: &Connection) -> Result<()> {
        for (column, definition) in OPTIONAL_COLUMNS {
            if !column_exists(conn, "tooling", column)? {
                info!(column, "adding missing tooling column");
                conn.execute(
                    &format!("ALTER TABLE tooling ADD COLUMN {column} {definition}"),
                    [],
                )?;
            }
        }
        self.columns_ensured.set(true);
        Ok(())
    }
}

/// True when `error` reports one of the late-added columns as missing.
pub fn is_missing_column(error: &rusqlite::Error) -> bool {
    let message = error.to_string();
    (message.contains("no such column") || message.contains("has no column named"))
        && OPTIONAL_COLUMNS
            .iter()
            .any(|(column, _)| message.contains(column))
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let pragma = format!("PRAGMA table_info({table})");
    let mut stmt = conn.prepare(&pragma)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
