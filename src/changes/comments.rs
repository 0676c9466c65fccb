use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use serde_json::value::RawValue;
use tracing::debug;

use crate::error::Result;

use super::fields::field_spec;
use super::{ChangeEntry, MISSING_VALUE};
use crate::normalize;

/// Origin tag for entries written while importing a workbook.
pub const IMPORT_ORIGIN: &str = "import";

/// One entry of a tool's audit log.
///
/// Reading is lenient: a missing `date` reads as empty and `system` also
/// accepts the strings `"true"` and `"false"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentEntry {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_flag",
        skip_serializing_if = "is_false"
    )]
    pub system: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn lenient_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(flag) => flag,
        Value::String(text) => text.trim().eq_ignore_ascii_case("true"),
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    })
}

impl CommentEntry {
    /// Entry typed by a person.
    pub fn user(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            date: format_timestamp(timestamp),
            text: text.into(),
            initial: None,
            system: false,
            origin: None,
        }
    }

    /// Entry generated by the change tracker.
    pub fn system(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            system: true,
            ..Self::user(text, timestamp)
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_initial(mut self, initial: impl Into<String>) -> Self {
        self.initial = Some(initial.into());
        self
    }
}

/// Append-only audit log stored as a JSON array inside one text field.
///
/// Items already in the array are kept verbatim, whatever their shape, and
/// are written back unchanged. Text that is not a JSON array (including
/// legacy plain-text comments) reads as an empty log.
#[derive(Debug, Clone, Default)]
pub struct CommentLog {
    items: Vec<Box<RawValue>>,
    entries: Vec<CommentEntry>,
}

impl CommentLog {
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        let items = match serde_json::from_str::<Vec<Box<RawValue>>>(raw) {
            Ok(items) => items,
            Err(_) => {
                debug!(length = raw.len(), "discarding comment log that is not a JSON array");
                Vec::new()
            }
        };
        let entries = items
            .iter()
            .filter_map(|item| serde_json::from_str::<CommentEntry>(item.get()).ok())
            .collect();
        Self { items, entries }
    }

    /// Items that read as entries. Array items of another shape are still
    /// counted by [`CommentLog::len`] and kept on write.
    pub fn entries(&self) -> &[CommentEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, entry: CommentEntry) -> Result<()> {
        self.items.push(serde_json::value::to_raw_value(&entry)?);
        self.entries.push(entry);
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.items)?)
    }
}

/// Renders change entries as one block, one `Label, old --> new` per line.
pub fn render_changes(changes: &[ChangeEntry]) -> String {
    changes
        .iter()
        .map(|change| {
            format!(
                "{}, {} --> {}",
                change.label, change.old_formatted, change.new_formatted
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// What [`merge_comments`] appends besides the existing log.
#[derive(Debug, Clone, Default)]
pub struct CommentMerge<'a> {
    /// Free-text comment supplied alongside the update.
    pub comment: Option<&'a str>,
    pub changes: &'a [ChangeEntry],
    /// Tags the system entry, e.g. [`IMPORT_ORIGIN`].
    pub origin: Option<&'a str>,
    pub initial: Option<&'a str>,
}

/// Appends the rendered changes as a system entry and the
/// free-text comment as a separate user entry.
///
/// With nothing to append the existing text is returned untouched, even when
/// it is not a valid log.
pub fn merge_comments(
    existing: &str,
    merge: &CommentMerge<'_>,
    timestamp: DateTime<Utc>,
) -> Result<String> {
    let block = render_changes(merge.changes);
    let comment = merge.comment.map(str::trim).filter(|text| !text.is_empty());
    if block.is_empty() && comment.is_none() {
        return Ok(existing.to_string());
    }

    let mut log = CommentLog::parse(existing);
    if !block.is_empty() {
        let mut entry = CommentEntry::system(block, timestamp);
        if let Some(origin) = merge.origin {
            entry = entry.with_origin(origin);
        }
        log.push(entry)?;
    }
    if let Some(text) = comment {
        let mut entry = CommentEntry::user(text, timestamp);
        if let Some(initial) = merge.initial {
            entry = entry.with_initial(initial);
        }
        if let Some(origin) = merge.origin {
            entry = entry.with_origin(origin);
        }
        log.push(entry)?;
    }
    log.to_json()
}

/// Log of a newly created tool: the starting tooling life as a system entry,
/// followed by the creator's comment when there is one.
pub fn initial_log(
    tooling_life_qty: f64,
    merge: &CommentMerge<'_>,
    timestamp: DateTime<Utc>,
) -> Result<String> {
    let start = ChangeEntry {
        field: "tooling_life_qty".into(),
        label: field_spec("tooling_life_qty").label,
        old_formatted: MISSING_VALUE.into(),
        new_formatted: normalize::format_number(tooling_life_qty),
    };
    let merge = CommentMerge {
        changes: std::slice::from_ref(&start),
        ..merge.clone()
    };
    merge_comments("[]", &merge, timestamp)
}

/// Timestamps in the log use RFC 3339 UTC with milliseconds.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
