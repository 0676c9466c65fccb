use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::changes::{self, ChangeEntry, CommentMerge, IMPORT_ORIGIN};
use crate::config::Settings;
use crate::error::{Result, ToolError};
use crate::io::excel_read::{self, SheetRow};
use crate::io::excel_write::{self, ExportWorkbook};
use crate::layout::WorkbookRow;
use crate::model::{ToolingId, ToolingRecord, same_supplier};
use crate::store::{RecordLookup, ToolingStore};

/// A row that will change storage once applied.
#[derive(Debug, Clone, PartialEq)]
pub enum RowMutation {
    /// Row without an id; `record` has no id until it is inserted.
    Create { row: u32, record: ToolingRecord },
    Update {
        row: u32,
        record: ToolingRecord,
        changes: Vec<ChangeEntry>,
    },
}

impl RowMutation {
    pub fn row(&self) -> u32 {
        match self {
            RowMutation::Create { row, .. } | RowMutation::Update { row, .. } => *row,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Neither an id nor a PN.
    Blank,
    /// The id does not belong to a record of this supplier.
    UnknownId(ToolingId),
    /// Nothing changed and no comment was left.
    Unchanged(ToolingId),
}

/// Result of planning an import. Nothing is written until
/// [`apply_mutations`] runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportOutcome {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub mutations: Vec<RowMutation>,
    pub skips: Vec<(u32, SkipReason)>,
    /// Rows skipped for an unknown id, written back into the rewritten file
    /// as the supplier left them.
    pub retained: Vec<WorkbookRow>,
}

impl ImportOutcome {
    pub fn summary(&self) -> String {
        format!(
            "Import finished: {} created, {} updated, {} skipped",
            self.created, self.updated, self.skipped
        )
    }

    fn skip(&mut self, row: u32, reason: SkipReason) {
        self.skipped += 1;
        self.skips.push((row, reason));
    }
}

/// Workbook contents for `records`. Records of other suppliers are left
/// out and rows are ordered by id.
pub fn supplier_workbook(
    records: &[ToolingRecord],
    supplier: &str,
    last_import: Option<String>,
    now: DateTime<Utc>,
) -> ExportWorkbook {
    let mut selected: Vec<&ToolingRecord> = records
        .iter()
        .filter(|record| same_supplier(&record.supplier, supplier))
        .collect();
    selected.sort_by_key(|record| record.id);

    ExportWorkbook {
        supplier: supplier.to_string(),
        rows: selected.into_iter().map(WorkbookRow::from_record).collect(),
        last_import,
        exported_at: now,
    }
}

/// Builds the supplier workbook for `records` as xlsx bytes.
#[instrument(level = "info", skip_all, fields(supplier = %supplier))]
pub fn export_workbook(
    records: &[ToolingRecord],
    supplier: &str,
    last_import: Option<String>,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Result<Vec<u8>> {
    let workbook = supplier_workbook(records, supplier, last_import, now);
    info!(rows = workbook.rows.len(), "exporting supplier workbook");
    excel_write::workbook_to_buffer(&workbook, settings)
}

/// Exports the supplier's stored records to `path`. Returns the row count.
#[instrument(level = "info", skip_all, fields(supplier = %supplier, output = %path.display()))]
pub fn export_to_file<S: ToolingStore + ?Sized>(
    store: &S,
    supplier: &str,
    path: &Path,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Result<usize> {
    let records = store.list_for_supplier(supplier)?;
    let last_import = store.last_import(supplier)?;
    let workbook = supplier_workbook(&records, supplier, last_import, now);
    excel_write::write_workbook(path, &workbook, settings)?;
    info!(rows = workbook.rows.len(), "exported supplier workbook");
    Ok(workbook.rows.len())
}

/// Plans an import: validates the workbook structure, then decides per row
/// whether to create, update or skip. Structural problems fail the whole
/// call before any row is looked at.
#[instrument(level = "info", skip_all, fields(supplier = %supplier))]
pub fn import_workbook<L: RecordLookup + ?Sized>(
    bytes: &[u8],
    supplier: &str,
    lookup: &L,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Result<ImportOutcome> {
    let inbound = excel_read::read_workbook(bytes, supplier, settings)?;
    let mut outcome = ImportOutcome::default();

    for SheetRow { number, row } in &inbound.rows {
        let number = *number;
        if row.is_blank() {
            outcome.skip(number, SkipReason::Blank);
            continue;
        }
        let comment = Some(row.supplier_comment.as_str()).filter(|text| !text.is_empty());

        let Some(id) = row.id else {
            let new = row.to_new_tooling(supplier);
            new.validate()?;
            let log = changes::initial_log(
                new.tooling_life_qty,
                &CommentMerge {
                    comment,
                    origin: Some(IMPORT_ORIGIN),
                    ..CommentMerge::default()
                },
                now,
            )?;
            let mut record = new.into_record(log);
            record.last_update = Some(changes::format_timestamp(now));
            debug!(row = number, pn = %record.pn, "new tool");
            outcome.created += 1;
            outcome.mutations.push(RowMutation::Create {
                row: number,
                record,
            });
            continue;
        };

        let Some(existing) = lookup.find_for_supplier(id, supplier)? else {
            warn!(row = number, id, "id not found for supplier; row skipped");
            outcome.skip(number, SkipReason::UnknownId(id));
            outcome.retained.push(row.clone());
            continue;
        };

        let detected = changes::diff_record(&existing.to_fields()?, &row.to_update_fields());
        if detected.is_empty() && comment.is_none() {
            outcome.skip(number, SkipReason::Unchanged(id));
            continue;
        }

        let mut record = existing.clone();
        row.apply_to(&mut record);
        record.comments = changes::merge_comments(
            &existing.comments,
            &CommentMerge {
                comment,
                changes: &detected,
                origin: Some(IMPORT_ORIGIN),
                initial: None,
            },
            now,
        )?;
        record.last_update = Some(changes::format_timestamp(now));
        debug!(row = number, id, changes = detected.len(), "tool updated");
        outcome.updated += 1;
        outcome.mutations.push(RowMutation::Update {
            row: number,
            record,
            changes: detected,
        });
    }

    info!(
        created = outcome.created,
        updated = outcome.updated,
        skipped = outcome.skipped,
        "import planned"
    );
    Ok(outcome)
}

/// Writes planned mutations row by row. Returns the ids assigned to created
/// rows, keyed by sheet row number.
#[instrument(level = "info", skip_all, fields(mutations = outcome.mutations.len()))]
pub fn apply_mutations<S: ToolingStore + ?Sized>(
    store: &S,
    outcome: &ImportOutcome,
) -> Result<Vec<(u32, ToolingId)>> {
    let mut created = Vec::new();
    for mutation in &outcome.mutations {
        match mutation {
            RowMutation::Create { row, record } => {
                let id = store.insert(record)?;
                debug!(row, id, "inserted tool");
                created.push((*row, id));
            }
            RowMutation::Update { record, .. } => {
                store.update(record)?;
                debug!(row = mutation.row(), id = record.id, "updated tool");
            }
        }
    }
    Ok(created)
}

/// Full import of a workbook file: plan, apply, stamp the supplier's import
/// time, then rewrite the file from storage so it carries the new ids and
/// timestamp and no longer holds the comments just consumed. Rows with an
/// unknown id follow the stored rows unchanged.
#[instrument(level = "info", skip_all, fields(supplier = %supplier, input = %path.display()))]
pub fn import_file<S: ToolingStore + ?Sized>(
    path: &Path,
    supplier: &str,
    store: &S,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Result<ImportOutcome> {
    if !path.exists() {
        return Err(ToolError::MissingInput(path.to_path_buf()));
    }
    let bytes = fs::read(path)?;
    let outcome = import_workbook(&bytes, supplier, store, settings, now)?;
    let created = apply_mutations(store, &outcome)?;
    debug!(created = created.len(), "mutations applied");

    let stamp = changes::format_timestamp(now);
    store.record_import(supplier, &stamp)?;

    let records = store.list_for_supplier(supplier)?;
    let mut refreshed = supplier_workbook(&records, supplier, Some(stamp), now);
    refreshed.rows.extend(outcome.retained.iter().cloned());
    excel_write::write_workbook(path, &refreshed, settings)?;
    info!("{}", outcome.summary());
    Ok(outcome)
}
