//! Conventions of the supplier workbook: sheet contents, header text, the
//! per-row field mapping and the expiration formula.

use chrono::NaiveDate;
use serde_json::{Number, Value};

use crate::error::{Result, ToolError};
use crate::model::{FieldMap, NewTooling, ToolingId, ToolingRecord};
use crate::normalize::{self, CellValue};

/// Number of columns on the data sheet.
pub const COLUMN_COUNT: usize = 11;

/// Header row of the data sheet. A trailing `*` marks a required column.
pub const HEADERS: [&str; COLUMN_COUNT] = [
    "ID",
    "PN*",
    "PN Description*",
    "Tooling Description*",
    "Tooling Life*",
    "Produced*",
    "Production Date",
    "Annual Volume",
    "Annual Volume Date",
    "Expiration Date",
    "Supplier's Comments",
];

/// Older header text still accepted on import, by column index.
pub const HEADER_ALIASES: &[(usize, &str)] = &[
    (7, "Forecast"),
    (7, "Annual Volume Forecast"),
    (8, "Forecast Date"),
    (10, "Supplier Comments"),
    (10, "Comments"),
];

pub const COL_ID: u16 = 0;
pub const COL_PN: u16 = 1;
pub const COL_PN_DESCRIPTION: u16 = 2;
pub const COL_TOOL_DESCRIPTION: u16 = 3;
pub const COL_LIFE: u16 = 4;
pub const COL_PRODUCED: u16 = 5;
pub const COL_PRODUCTION_DATE: u16 = 6;
pub const COL_ANNUAL_VOLUME: u16 = 7;
pub const COL_ANNUAL_VOLUME_DATE: u16 = 8;
pub const COL_EXPIRATION: u16 = 9;
pub const COL_COMMENTS: u16 = 10;

/// Columns holding numbers.
pub const NUMERIC_COLUMNS: [u16; 3] = [COL_LIFE, COL_PRODUCED, COL_ANNUAL_VOLUME];
/// Columns holding dates.
pub const DATE_COLUMNS: [u16; 3] = [COL_PRODUCTION_DATE, COL_ANNUAL_VOLUME_DATE, COL_EXPIRATION];

/// A1 of the verification sheet.
pub const VERIFICATION_LABEL: &str = "key";

pub const SUPPLIER_LABEL: &str = "Supplier";
pub const LAST_IMPORT_LABEL: &str = "Last Import Timestamp";
pub const EXPORTED_AT_LABEL: &str = "Exported At";
pub const NEVER_IMPORTED: &str = "Never";

/// Static text on the information sheet.
pub const INSTRUCTIONS: &[&str] = &[
    "Update Tooling Life, Produced, Production Date and the annual volume columns for your tools.",
    "Add new tools in the empty rows at the bottom: fill PN and leave ID blank.",
    "Do not change the ID column; it links each row to the stored record.",
    "Expiration Date is calculated by the sheet and ignored on import.",
    "Dates use DD/MM/YYYY. Numbers may use either 1.234,56 or 1,234.56.",
    "Write any remarks in Supplier's Comments; they are added to the tool's history on import.",
];

/// Spreadsheet column letter for a zero-based index.
pub fn column_letter(index: u16) -> String {
    let mut index = u32::from(index) + 1;
    let mut letters = Vec::new();
    while index > 0 {
        let remainder = ((index - 1) % 26) as u8;
        letters.push((b'A' + remainder) as char);
        index = (index - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn header_matches(index: usize, actual: &str) -> bool {
    let actual = actual.trim();
    let expected = HEADERS[index];
    actual == expected
        || actual == expected.trim_end_matches('*')
        || HEADER_ALIASES
            .iter()
            .any(|(column, alias)| *column == index && *alias == actual)
}

/// Checks the header row of the data sheet and reports every mismatching
/// column with its expected and actual text.
pub fn verify_headers(sheet: &str, actual: &[String]) -> Result<()> {
    let mismatches: Vec<String> = HEADERS
        .iter()
        .enumerate()
        .filter_map(|(index, expected)| {
            let found = actual.get(index).map(|text| text.trim()).unwrap_or_default();
            (!header_matches(index, found)).then(|| {
                format!(
                    "Column {} ({}): expected '{}', found '{}'",
                    index + 1,
                    column_letter(index as u16),
                    expected,
                    found
                )
            })
        })
        .collect();

    if mismatches.is_empty() {
        return Ok(());
    }
    Err(ToolError::HeaderMismatch {
        sheet: sheet.to_string(),
        details: mismatches.join("\n"),
    })
}

/// Live formula for the Expiration Date cell on 1-based spreadsheet row
/// `row`. Mirrors [`crate::forecast::compute_expiration`]: blank life gives
/// an empty cell, exhausted life the base date, missing volume counts units
/// as days, otherwise `remaining / volume × 365` days.
pub fn expiration_formula(row: u32) -> String {
    let life = format!("{}{row}", column_letter(COL_LIFE));
    let produced = format!("{}{row}", column_letter(COL_PRODUCED));
    let production = format!("{}{row}", column_letter(COL_PRODUCTION_DATE));
    let volume = format!("{}{row}", column_letter(COL_ANNUAL_VOLUME));
    let base = format!("IF({production}=\"\",TODAY(),{production})");
    let remaining = format!("({life}-{produced})");
    format!(
        "=IF({life}=\"\",\"\",IF({remaining}<=0,{base},IF(OR({volume}=\"\",{volume}<=0),\
         {base}+ROUND({remaining},0),{base}+ROUND({remaining}/{volume}*365,0))))"
    )
}

/// One data-sheet row in normalised form.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkbookRow {
    pub id: Option<ToolingId>,
    pub pn: String,
    pub pn_description: String,
    pub tool_description: String,
    pub tooling_life_qty: f64,
    pub produced: f64,
    pub production_date: Option<NaiveDate>,
    pub annual_volume: Option<f64>,
    pub annual_volume_date: Option<NaiveDate>,
    pub supplier_comment: String,
}

impl WorkbookRow {
    pub fn from_record(record: &ToolingRecord) -> Self {
        let date = |value: &Option<String>| {
            value
                .as_deref()
                .and_then(|text| normalize::parse_date(&CellValue::from(text)))
        };
        Self {
            id: Some(record.id),
            pn: record.pn.clone(),
            pn_description: record.pn_description.clone(),
            tool_description: record.tool_description.clone(),
            tooling_life_qty: record.tooling_life_qty,
            produced: record.produced,
            production_date: date(&record.date_remaining_tooling_life),
            annual_volume: record.annual_volume_forecast,
            annual_volume_date: date(&record.date_annual_volume),
            supplier_comment: String::new(),
        }
    }

    /// Normalises the cells of one data row. The Expiration Date column is
    /// ignored; it is recomputed, never read.
    pub fn from_cells(cells: &[CellValue]) -> Self {
        let cell = |column: u16| cells.get(usize::from(column)).unwrap_or(&CellValue::Empty);
        let text = |column: u16| cell(column).as_plain_text().trim().to_string();
        Self {
            id: normalize::parse_number_opt(cell(COL_ID))
                .filter(|id| *id >= 1.0)
                .map(|id| id.trunc() as ToolingId),
            pn: text(COL_PN),
            pn_description: text(COL_PN_DESCRIPTION),
            tool_description: text(COL_TOOL_DESCRIPTION),
            tooling_life_qty: normalize::parse_localized_number(cell(COL_LIFE)),
            produced: normalize::parse_localized_number(cell(COL_PRODUCED)),
            production_date: normalize::parse_date(cell(COL_PRODUCTION_DATE)),
            annual_volume: normalize::parse_number_opt(cell(COL_ANNUAL_VOLUME)),
            annual_volume_date: normalize::parse_date(cell(COL_ANNUAL_VOLUME_DATE)),
            supplier_comment: text(COL_COMMENTS),
        }
    }

    /// Row with neither an id nor a PN (padding).
    pub fn is_blank(&self) -> bool {
        self.id.is_none() && self.pn.is_empty()
    }

    /// Fields the row maps onto, keyed by record field name.
    pub fn to_fields(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("pn".into(), Value::String(self.pn.clone()));
        fields.insert("pn_description".into(), Value::String(self.pn_description.clone()));
        fields.insert("tool_description".into(), Value::String(self.tool_description.clone()));
        fields.insert("tooling_life_qty".into(), number_value(Some(self.tooling_life_qty)));
        fields.insert("produced".into(), number_value(Some(self.produced)));
        fields.insert("date_remaining_tooling_life".into(), date_value(self.production_date));
        fields.insert("annual_volume_forecast".into(), number_value(self.annual_volume));
        fields.insert("date_annual_volume".into(), date_value(self.annual_volume_date));
        fields
    }

    pub fn to_new_tooling(&self, supplier: &str) -> NewTooling {
        NewTooling {
            pn: self.pn.clone(),
            supplier: supplier.to_string(),
            pn_description: self.pn_description.clone(),
            tool_description: self.tool_description.clone(),
            tooling_life_qty: self.tooling_life_qty,
            produced: self.produced,
            date_remaining_tooling_life: self.production_date.map(normalize::to_iso),
            annual_volume_forecast: self.annual_volume,
            date_annual_volume: self.annual_volume_date.map(normalize::to_iso),
        }
    }

    /// Copies the row's values onto a stored record. Required text columns
    /// left blank keep the stored value.
    pub fn apply_to(&self, record: &mut ToolingRecord) {
        let keep_required = |incoming: &str, current: &mut String| {
            if !incoming.is_empty() {
                *current = incoming.to_string();
            }
        };
        keep_required(&self.pn, &mut record.pn);
        keep_required(&self.pn_description, &mut record.pn_description);
        keep_required(&self.tool_description, &mut record.tool_description);
        record.tooling_life_qty = self.tooling_life_qty;
        record.produced = self.produced;
        record.date_remaining_tooling_life = self.production_date.map(normalize::to_iso);
        record.annual_volume_forecast = self.annual_volume;
        record.date_annual_volume = self.annual_volume_date.map(normalize::to_iso);
        record.recompute_derived();
    }

    /// The row's fields, minus required text columns left blank.
    pub fn to_update_fields(&self) -> FieldMap {
        let mut fields = self.to_fields();
        for required in ["pn", "pn_description", "tool_description"] {
            if fields.get(required).and_then(Value::as_str).is_some_and(str::is_empty) {
                fields.remove(required);
            }
        }
        fields
    }
}

fn number_value(value: Option<f64>) -> Value {
    value
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn date_value(value: Option<NaiveDate>) -> Value {
    value
        .map(|date| Value::String(normalize::to_iso(date)))
        .unwrap_or(Value::Null)
}

/// Width for a column whose longest entry has `max_chars` characters.
pub fn fitted_width(max_chars: usize, min: f64, max: f64) -> f64 {
    (max_chars as f64 + 2.0).clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn exact_headers_pass() {
        assert!(verify_headers("Tooling", &headers(&HEADERS)).is_ok());
    }

    #[test]
    fn aliases_and_unstarred_headers_pass() {
        let mut actual = headers(&HEADERS);
        actual[7] = "Forecast".into();
        actual[1] = "PN".into();
        actual[4] = " Tooling Life ".into();
        assert!(verify_headers("Tooling", &actual).is_ok());
    }

    #[test]
    fn missing_column_is_reported_by_number() {
        let mut actual = headers(&HEADERS);
        actual.remove(4);
        let error = verify_headers("Tooling", &actual).expect_err("must fail");
        let message = error.to_string();
        assert!(message.contains("Column 5 (E): expected 'Tooling Life*', found 'Produced*'"));
        assert!(!message.contains("Column 1 "));
    }

    #[test]
    fn alias_only_applies_to_its_column() {
        let mut actual = headers(&HEADERS);
        actual[2] = "Forecast".into();
        assert!(verify_headers("Tooling", &actual).is_err());
    }

    #[test]
    fn column_letters() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(9), "J");
        assert_eq!(column_letter(26), "AA");
    }

    #[test]
    fn formula_follows_forecast_branches() {
        assert_eq!(
            expiration_formula(2),
            "=IF(E2=\"\",\"\",IF((E2-F2)<=0,IF(G2=\"\",TODAY(),G2),\
             IF(OR(H2=\"\",H2<=0),IF(G2=\"\",TODAY(),G2)+ROUND((E2-F2),0),\
             IF(G2=\"\",TODAY(),G2)+ROUND((E2-F2)/H2*365,0))))"
        );
    }

    #[test]
    fn cells_are_normalised() {
        let cells = vec![
            CellValue::Number(12.0),
            CellValue::text(" PN-9 "),
            CellValue::text("Bracket"),
            CellValue::text("Stamping die"),
            CellValue::text("1.000.000"),
            CellValue::text("250.000,5"),
            CellValue::text("15/01/2025"),
            CellValue::Empty,
            CellValue::DateSerial(45658.0),
            CellValue::Number(99999.0),
            CellValue::text("ok"),
        ];
        let row = WorkbookRow::from_cells(&cells);
        assert_eq!(row.id, Some(12));
        assert_eq!(row.pn, "PN-9");
        assert_eq!(row.tooling_life_qty, 1_000_000.0);
        assert_eq!(row.produced, 250_000.5);
        assert_eq!(row.production_date, NaiveDate::from_ymd_opt(2025, 1, 15));
        assert_eq!(row.annual_volume, None);
        assert_eq!(row.annual_volume_date, NaiveDate::from_ymd_opt(2025, 1, 1));
        assert_eq!(row.supplier_comment, "ok");
    }

    #[test]
    fn blank_rows_and_invalid_ids() {
        let row = WorkbookRow::from_cells(&[CellValue::text("abc")]);
        assert!(row.is_blank());
        let row = WorkbookRow::from_cells(&[CellValue::Number(0.0), CellValue::text("PN")]);
        assert_eq!(row.id, None);
        assert!(!row.is_blank());
    }

    #[test]
    fn blank_required_text_keeps_stored_value() {
        let mut record = ToolingRecord {
            id: 3,
            pn: "PN-3".into(),
            tooling_life_qty: 10.0,
            ..ToolingRecord::default()
        };
        let row = WorkbookRow {
            id: Some(3),
            tooling_life_qty: 100.0,
            produced: 40.0,
            ..WorkbookRow::default()
        };
        row.apply_to(&mut record);
        assert_eq!(record.pn, "PN-3");
        assert_eq!(record.remaining_tooling_life_pcs, 60.0);
        assert!(!row.to_update_fields().contains_key("pn"));
    }
}
