/// How a field is compared and displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Number,
    Date,
    Text,
}

/// Label and kind of a tracked field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub label: String,
    pub kind: FieldKind,
}

/// Fields that are never diffed: the log itself, derived values and the
/// update timestamp.
const EXCLUDED_FIELDS: &[&str] = &[
    "id",
    "comments",
    "remaining_tooling_life_pcs",
    "percent_tooling_life",
    "last_update",
];

const DECLARED_FIELDS: &[(&str, &str, FieldKind)] = &[
    ("pn", "PN", FieldKind::Text),
    ("pn_description", "PN Description", FieldKind::Text),
    ("tool_description", "Tooling Description", FieldKind::Text),
    ("supplier", "Supplier", FieldKind::Text),
    ("tooling_life_qty", "Tooling Life (qty)", FieldKind::Number),
    ("produced", "Produced (qty)", FieldKind::Number),
    ("date_remaining_tooling_life", "Production Date", FieldKind::Date),
    ("annual_volume_forecast", "Annual Volume", FieldKind::Number),
    ("date_annual_volume", "Annual Volume Date", FieldKind::Date),
    ("expiration_date", "Expiration Date", FieldKind::Date),
    ("status", "Status", FieldKind::Text),
    ("replacement_tooling_id", "Replacement Tooling ID", FieldKind::Number),
];

const NUMBER_HINTS: &[&str] = &["qty", "amount", "produced", "forecast", "life", "percent", "value"];

/// Whether changes to `field` belong in the audit log.
pub fn is_tracked(field: &str) -> bool {
    !(field.starts_with('_') || field.starts_with('$') || EXCLUDED_FIELDS.contains(&field))
}

/// Position of a declared field, used to order change lines.
pub fn declared_position(field: &str) -> Option<usize> {
    DECLARED_FIELDS.iter().position(|(name, ..)| *name == field)
}

/// Label and kind for `field`, inferred from its name when it is not one of
/// the declared tooling fields.
pub fn field_spec(field: &str) -> FieldSpec {
    if let Some((_, label, kind)) = DECLARED_FIELDS.iter().find(|(name, ..)| *name == field) {
        return FieldSpec {
            label: (*label).to_string(),
            kind: *kind,
        };
    }
    FieldSpec {
        label: infer_label(field),
        kind: infer_kind(field),
    }
}

fn infer_kind(field: &str) -> FieldKind {
    let lowered = field.to_ascii_lowercase();
    if lowered.contains("date") {
        FieldKind::Date
    } else if NUMBER_HINTS.iter().any(|hint| lowered.contains(hint)) {
        FieldKind::Number
    } else {
        FieldKind::Text
    }
}

fn infer_label(field: &str) -> String {
    field
        .split(['_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
