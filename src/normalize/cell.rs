use calamine::DataType;
use chrono::NaiveDate;
use serde_json::Value;

use super::date;
use super::number;

/// Content of a single spreadsheet cell or user-supplied field value.
///
/// Workbook readers and UI callers hand over values in several shapes
/// (cached formula results, rich-text runs, date serials, plain strings).
/// They are all folded into this type at the boundary so the parsers below
/// only resolve one representation.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    /// Spreadsheet date serial (days since 1899-12-30, fraction = time of day).
    DateSerial(f64),
    Date(NaiveDate),
    /// Formula cell; only the cached result carries data.
    Formula {
        formula: String,
        result: Box<CellValue>,
    },
    /// Rich-text cell split into its runs.
    RichText(Vec<String>),
    Error(String),
}

impl CellValue {
    /// Creates a text value.
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    /// Follows formula wrappers down to the value they produced.
    pub fn resolved(&self) -> &CellValue {
        match self {
            CellValue::Formula { result, .. } => result.resolved(),
            other => other,
        }
    }

    /// True when the cell carries nothing a user typed.
    pub fn is_blank(&self) -> bool {
        match self.resolved() {
            CellValue::Empty => true,
            CellValue::Text(text) => text.trim().is_empty(),
            CellValue::RichText(runs) => runs.iter().all(|run| run.trim().is_empty()),
            _ => false,
        }
    }

    /// Renders the value as the text a user would see typed into the cell.
    pub fn as_plain_text(&self) -> String {
        match self.resolved() {
            CellValue::Empty | CellValue::Error(_) => String::new(),
            CellValue::Text(text) => text.clone(),
            CellValue::Number(value) => number::canonical_number(*value),
            CellValue::Bool(value) => value.to_string(),
            CellValue::DateSerial(serial) => date::serial_to_date(*serial)
                .map(date::to_iso)
                .unwrap_or_else(|| number::canonical_number(*serial)),
            CellValue::Date(value) => date::to_iso(*value),
            CellValue::RichText(runs) => runs.concat(),
            CellValue::Formula { .. } => String::new(),
        }
    }

    /// Locale-tolerant numeric reading; `None` when the cell has no number.
    pub fn as_number(&self) -> Option<f64> {
        number::parse_number_opt(self)
    }

    /// Lenient date reading used for display and import.
    pub fn as_date(&self) -> Option<NaiveDate> {
        date::parse_date(self)
    }
}

impl From<&DataType> for CellValue {
    fn from(cell: &DataType) -> Self {
        match cell {
            DataType::Empty => CellValue::Empty,
            DataType::String(value) => CellValue::Text(value.clone()),
            DataType::Float(value) => CellValue::Number(*value),
            DataType::Int(value) => CellValue::Number(*value as f64),
            DataType::Bool(value) => CellValue::Bool(*value),
            DataType::DateTime(serial) => CellValue::DateSerial(*serial),
            DataType::Error(_) => CellValue::Error(cell.to_string()),
            other => CellValue::Text(other.to_string()),
        }
    }
}

impl From<Option<&DataType>> for CellValue {
    fn from(cell: Option<&DataType>) -> Self {
        cell.map(CellValue::from).unwrap_or(CellValue::Empty)
    }
}

impl From<&Value> for CellValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => CellValue::Empty,
            Value::Bool(flag) => CellValue::Bool(*flag),
            Value::Number(number) => number
                .as_f64()
                .map(CellValue::Number)
                .unwrap_or(CellValue::Empty),
            Value::String(text) => CellValue::Text(text.clone()),
            Value::Array(items) => CellValue::RichText(
                items
                    .iter()
                    .map(|item| CellValue::from(item).as_plain_text())
                    .collect(),
            ),
            Value::Object(map) => {
                if let Some(result) = map.get("result") {
                    let formula = map
                        .get("formula")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    CellValue::Formula {
                        formula,
                        result: Box::new(CellValue::from(result)),
                    }
                } else if let Some(Value::Array(runs)) = map.get("richText") {
                    CellValue::RichText(
                        runs.iter()
                            .map(|run| match run.get("text") {
                                Some(text) => CellValue::from(text).as_plain_text(),
                                None => String::new(),
                            })
                            .collect(),
                    )
                } else if let Some(text) = map.get("text") {
                    CellValue::from(text)
                } else {
                    CellValue::Empty
                }
            }
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<Option<f64>> for CellValue {
    fn from(value: Option<f64>) -> Self {
        value.map(CellValue::Number).unwrap_or(CellValue::Empty)
    }
}

impl From<Option<NaiveDate>> for CellValue {
    fn from(value: Option<NaiveDate>) -> Self {
        value.map(CellValue::Date).unwrap_or(CellValue::Empty)
    }
}
