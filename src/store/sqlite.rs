use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::warn;

use super::schema::{self, BASE_SCHEMA, SchemaState};
use super::{RecordLookup, ToolingStore};
use crate::error::{Result, ToolError};
use crate::model::{ToolingId, ToolingRecord};

const SELECT_TOOLING: &str = "SELECT id, pn, supplier, pn_description, tool_description,
        tooling_life_qty, produced, remaining_tooling_life_pcs, percent_tooling_life,
        annual_volume_forecast, date_annual_volume, date_remaining_tooling_life,
        expiration_date, status, replacement_tooling_id, comments, last_update
     FROM tooling";

/// SQLite-backed [`ToolingStore`].
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    schema: SchemaState,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path`. Optional columns
    /// are added by [`SqliteStore::migrate`], not here.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::new(Connection::open(path)?, SchemaState::default())
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?, SchemaState::default())
    }

    pub fn new(conn: Connection, schema: SchemaState) -> Result<Self> {
        conn.execute_batch(BASE_SCHEMA)?;
        Ok(Self { conn, schema })
    }

    /// Brings the schema up to date. Call once at startup.
    pub fn migrate(&self) -> Result<()> {
        self.schema.ensure_columns(&self.conn)
    }

    pub fn schema(&self) -> &SchemaState {
        &self.schema
    }

    /// Runs a statement; when it fails because a late-added column is
    /// missing, repairs the schema once and retries the same statement.
    fn with_column_repair<T>(&self, op: impl Fn(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        match op(&self.conn) {
            Err(error) if schema::is_missing_column(&error) && self.schema.claim_repair() => {
                warn!(%error, "statement hit a missing column; repairing schema and retrying");
                self.schema.ensure_columns(&self.conn)?;
                Ok(op(&self.conn)?)
            }
            other => Ok(other?),
        }
    }

    fn all_records(&self) -> Result<Vec<ToolingRecord>> {
        self.with_column_repair(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_TOOLING} ORDER BY id"))?;
            let rows = stmt.query_map([], row_to_record)?;
            rows.collect()
        })
    }
}

impl RecordLookup for SqliteStore {
    fn find_for_supplier(&self, id: ToolingId, supplier: &str) -> Result<Option<ToolingRecord>> {
        let record = self.get(id)?;
        Ok(record.filter(|record| crate::model::same_supplier(&record.supplier, supplier)))
    }
}

impl ToolingStore for SqliteStore {
    fn insert(&self, record: &ToolingRecord) -> Result<ToolingId> {
        self.with_column_repair(|conn| {
            conn.execute(
                "INSERT INTO tooling (
                   pn, supplier, pn_description, tool_description, tooling_life_qty, produced,
                   remaining_tooling_life_pcs, percent_tooling_life, annual_volume_forecast,
                   date_annual_volume, date_remaining_tooling_life, expiration_date, status,
                   replacement_tooling_id, comments, last_update
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    record.pn,
                    record.supplier,
                    record.pn_description,
                    record.tool_description,
                    record.tooling_life_qty,
                    record.produced,
                    record.remaining_tooling_life_pcs,
                    record.percent_tooling_life,
                    record.annual_volume_forecast,
                    record.date_annual_volume,
                    record.date_remaining_tooling_life,
                    record.expiration_date,
                    record.status,
                    record.replacement_tooling_id.map(|id| id as i64),
                    record.comments,
                    record.last_update,
                ],
            )?;
            Ok(conn.last_insert_rowid() as ToolingId)
        })
    }

    fn update(&self, record: &ToolingRecord) -> Result<()> {
        let changed = self.with_column_repair(|conn| {
            conn.execute(
                "UPDATE tooling SET
                   pn = ?2, supplier = ?3, pn_description = ?4, tool_description = ?5,
                   tooling_life_qty = ?6, produced = ?7, remaining_tooling_life_pcs = ?8,
                   percent_tooling_life = ?9, annual_volume_forecast = ?10,
                   date_annual_volume = ?11, date_remaining_tooling_life = ?12,
                   expiration_date = ?13, status = ?14, replacement_tooling_id = ?15,
                   comments = ?16, last_update = ?17
                 WHERE id = ?1",
                params![
                    record.id as i64,
                    record.pn,
                    record.supplier,
                    record.pn_description,
                    record.tool_description,
                    record.tooling_life_qty,
                    record.produced,
                    record.remaining_tooling_life_pcs,
                    record.percent_tooling_life,
                    record.annual_volume_forecast,
                    record.date_annual_volume,
                    record.date_remaining_tooling_life,
                    record.expiration_date,
                    record.status,
                    record.replacement_tooling_id.map(|id| id as i64),
                    record.comments,
                    record.last_update,
                ],
            )
        })?;
        if changed == 0 {
            return Err(ToolError::NotFound(record.id));
        }
        Ok(())
    }

    fn get(&self, id: ToolingId) -> Result<Option<ToolingRecord>> {
        self.with_column_repair(|conn| {
            conn.query_row(
                &format!("{SELECT_TOOLING} WHERE id = ?1"),
                params![id as i64],
                row_to_record,
            )
            .optional()
        })
    }

    fn list_for_supplier(&self, supplier: &str) -> Result<Vec<ToolingRecord>> {
        // Supplier matching ignores case and spacing, which SQL cannot index.
        Ok(self
            .all_records()?
            .into_iter()
            .filter(|record| crate::model::same_supplier(&record.supplier, supplier))
            .collect())
    }

    fn last_import(&self, supplier: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT last_import FROM supplier_metadata WHERE supplier = ?1",
                params![supplier_key(supplier)],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(value.flatten())
    }

    fn record_import(&self, supplier: &str, timestamp: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO supplier_metadata (supplier, last_import) VALUES (?1, ?2)
             ON CONFLICT(supplier) DO UPDATE SET last_import = excluded.last_import",
            params![supplier_key(supplier), timestamp],
        )?;
        Ok(())
    }
}

/// Metadata rows are keyed the way supplier names are compared.
fn supplier_key(supplier: &str) -> String {
    supplier
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ToolingRecord> {
    Ok(ToolingRecord {
        id: row.get::<_, i64>("id")? as ToolingId,
        pn: row.get("pn")?,
        supplier: row.get("supplier")?,
        pn_description: row.get("pn_description")?,
        tool_description: row.get("tool_description")?,
        tooling_life_qty: row.get("tooling_life_qty")?,
        produced: row.get("produced")?,
        remaining_tooling_life_pcs: row.get("remaining_tooling_life_pcs")?,
        percent_tooling_life: row.get("percent_tooling_life")?,
        annual_volume_forecast: row.get("annual_volume_forecast")?,
        date_annual_volume: row.get("date_annual_volume")?,
        date_remaining_tooling_life: row.get("date_remaining_tooling_life")?,
        expiration_date: row.get("expiration_date")?,
        status: row.get("status")?,
        replacement_tooling_id: row
            .get::<_, Option<i64>>("replacement_tooling_id")?
            .filter(|id| *id > 0)
            .map(|id| id as ToolingId),
        comments: row.get("comments")?,
        last_update: row.get("last_update")?,
    })
}
