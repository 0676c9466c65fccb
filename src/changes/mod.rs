//! Field-level change detection and the inline audit log.

pub mod comments;
pub mod fields;

use serde::Serialize;
use serde_json::Value;

use crate::model::FieldMap;
use crate::normalize::{self, CellValue};

pub use comments::{
    CommentEntry, CommentLog, CommentMerge, IMPORT_ORIGIN, format_timestamp, initial_log,
    merge_comments, render_changes,
};
pub use fields::{FieldKind, FieldSpec, field_spec, is_tracked};

/// Placeholder shown for a side of a change that has no value.
pub const MISSING_VALUE: &str = "N/A";

/// One detected field change, already formatted for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEntry {
    pub field: String,
    pub label: String,
    pub old_formatted: String,
    pub new_formatted: String,
}

/// Compares every tracked field present in `incoming` with the
/// stored value. Values are normalised per field kind before comparison, so
/// `"10"` and `10`, or `2024-01-01` and `01/01/2024`, are not changes.
pub fn diff_record(existing: &FieldMap, incoming: &FieldMap) -> Vec<ChangeEntry> {
    let mut changes: Vec<ChangeEntry> = incoming
        .iter()
        .filter(|(field, _)| is_tracked(field))
        .filter_map(|(field, new_value)| {
            let old_value = existing.get(field).unwrap_or(&Value::Null);
            diff_field(field, old_value, new_value)
        })
        .collect();
    changes.sort_by_key(|change| {
        (
            fields::declared_position(&change.field).unwrap_or(usize::MAX),
            change.field.clone(),
        )
    });
    changes
}

fn diff_field(field: &str, old_value: &Value, new_value: &Value) -> Option<ChangeEntry> {
    let spec = field_spec(field);
    let old_cell = CellValue::from(old_value);
    let new_cell = CellValue::from(new_value);
    if comparable(spec.kind, &old_cell) == comparable(spec.kind, &new_cell) {
        return None;
    }
    Some(ChangeEntry {
        field: field.to_string(),
        old_formatted: display(spec.kind, &old_cell),
        new_formatted: display(spec.kind, &new_cell),
        label: spec.label,
    })
}

/// Canonical text compared for equality; empty means "absent".
fn comparable(kind: FieldKind, value: &CellValue) -> String {
    match kind {
        FieldKind::Number => normalize::parse_number_opt(value)
            .map(normalize::number::canonical_number)
            .unwrap_or_default(),
        FieldKind::Date => normalize::normalize_date_strict(value),
        FieldKind::Text => value.as_plain_text().trim().to_string(),
    }
}

fn display(kind: FieldKind, value: &CellValue) -> String {
    let rendered = match kind {
        FieldKind::Number => normalize::parse_number_opt(value)
            .map(normalize::format_number)
            .unwrap_or_default(),
        FieldKind::Date => normalize::parse_date_strict(value)
            .map(normalize::to_display)
            .unwrap_or_default(),
        FieldKind::Text => value.as_plain_text().trim().to_string(),
    };
    if rendered.is_empty() {
        MISSING_VALUE.to_string()
    } else {
        rendered
    }
}
