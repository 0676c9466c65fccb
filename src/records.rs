//! Explicit record operations, the non-spreadsheet way of creating and
//! editing tools. Both go through the same change log as an import.

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::changes::{self, ChangeEntry, CommentMerge};
use crate::error::{Result, ToolError};
use crate::model::{FieldMap, NewTooling, ToolingId, ToolingRecord};
use crate::normalize::CellValue;
use crate::store::ToolingStore;

/// Creates a tool from the minimal required fields. The log starts with the
/// initial tooling life and the optional comment.
#[instrument(level = "info", skip_all, fields(pn = %new.pn, supplier = %new.supplier))]
pub fn create_tooling<S: ToolingStore + ?Sized>(
    store: &S,
    new: NewTooling,
    comment: Option<&str>,
    now: DateTime<Utc>,
) -> Result<ToolingRecord> {
    new.validate()?;
    let log = changes::initial_log(
        new.tooling_life_qty,
        &CommentMerge {
            comment,
            ..CommentMerge::default()
        },
        now,
    )?;
    let mut record = new.into_record(log);
    record.last_update = Some(changes::format_timestamp(now));
    record.id = store.insert(&record)?;
    info!(id = record.id, "tool created");
    Ok(record)
}

/// Applies field updates to a stored tool. Detected changes and the
/// optional comment are appended to the log; an update that changes
/// nothing and carries no comment leaves the record untouched.
#[instrument(level = "info", skip_all, fields(id = id))]
pub fn update_tooling<S: ToolingStore + ?Sized>(
    store: &S,
    id: ToolingId,
    incoming: &FieldMap,
    comment: Option<&str>,
    initial: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(ToolingRecord, Vec<ChangeEntry>)> {
    let existing = store.get(id)?.ok_or(ToolError::NotFound(id))?;
    let detected = changes::diff_record(&existing.to_fields()?, incoming);
    let comment = comment.map(str::trim).filter(|text| !text.is_empty());
    if detected.is_empty() && comment.is_none() {
        return Ok((existing, detected));
    }

    let mut record = existing.clone();
    for change in &detected {
        let value = incoming
            .get(&change.field)
            .map(CellValue::from)
            .unwrap_or(CellValue::Empty);
        record.set_field(&change.field, &value)?;
    }
    record.comments = changes::merge_comments(
        &existing.comments,
        &CommentMerge {
            comment,
            changes: &detected,
            origin: None,
            initial,
        },
        now,
    )?;
    record.last_update = Some(changes::format_timestamp(now));
    store.update(&record)?;
    info!(changes = detected.len(), "tool updated");
    Ok((record, detected))
}
