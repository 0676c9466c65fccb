pub mod chain;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, ToolError};
use crate::normalize::{self, CellValue};

/// Identifier assigned to a tooling record by storage.
pub type ToolingId = u64;

/// Field name → value mapping used when records are diffed.
pub type FieldMap = Map<String, Value>;

/// Status value that switches a tool to the obsolete classification.
pub const OBSOLETE_STATUS: &str = "obsolete";

/// A tool as persisted by storage.
///
/// Dates are kept as the text storage holds (ISO once written by this
/// crate); readers go through [`crate::normalize`] so legacy values never
/// cause a failure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolingRecord {
    pub id: ToolingId,
    pub pn: String,
    pub supplier: String,
    pub pn_description: String,
    pub tool_description: String,
    pub tooling_life_qty: f64,
    pub produced: f64,
    pub remaining_tooling_life_pcs: f64,
    pub percent_tooling_life: f64,
    pub annual_volume_forecast: Option<f64>,
    pub date_annual_volume: Option<String>,
    /// Production measurement date; base of the expiration forecast.
    pub date_remaining_tooling_life: Option<String>,
    pub expiration_date: Option<String>,
    pub status: String,
    pub replacement_tooling_id: Option<ToolingId>,
    /// JSON array text, see [`crate::changes::CommentLog`].
    pub comments: String,
    pub last_update: Option<String>,
}

impl ToolingRecord {
    /// Re-derives the remaining life and percentage from life and production.
    pub fn recompute_derived(&mut self) {
        self.remaining_tooling_life_pcs = remaining_life(self.tooling_life_qty, self.produced);
        self.percent_tooling_life = percent_used(self.tooling_life_qty, self.produced);
    }

    pub fn is_obsolete(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case(OBSOLETE_STATUS)
    }

    /// The replacement reference when it points at a valid id.
    pub fn replacement(&self) -> Option<ToolingId> {
        self.replacement_tooling_id.filter(|id| *id > 0)
    }

    /// Field mapping handed to the change tracker.
    pub fn to_fields(&self) -> Result<FieldMap> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(FieldMap::new()),
        }
    }

    /// Assigns one field from an arbitrary input value, normalising it the
    /// way the field is stored. Derived fields are recomputed afterwards.
    pub fn set_field(&mut self, field: &str, value: &CellValue) -> Result<()> {
        match field {
            "pn" => self.pn = value.as_plain_text().trim().to_string(),
            "supplier" => self.supplier = value.as_plain_text().trim().to_string(),
            "pn_description" => self.pn_description = value.as_plain_text().trim().to_string(),
            "tool_description" => {
                self.tool_description = value.as_plain_text().trim().to_string()
            }
            "status" => self.status = value.as_plain_text().trim().to_string(),
            "tooling_life_qty" => self.tooling_life_qty = normalize::normalize_number(value),
            "produced" => self.produced = normalize::normalize_number(value),
            "annual_volume_forecast" => {
                self.annual_volume_forecast = normalize::parse_number_opt(value)
            }
            "date_annual_volume" => self.date_annual_volume = optional_date(value),
            "date_remaining_tooling_life" => {
                self.date_remaining_tooling_life = optional_date(value)
            }
            "expiration_date" => self.expiration_date = optional_date(value),
            "replacement_tooling_id" => {
                self.replacement_tooling_id = normalize::parse_number_opt(value)
                    .filter(|id| *id >= 1.0)
                    .map(|id| id.trunc() as ToolingId)
            }
            other => {
                return Err(ToolError::InvalidRecord(format!(
                    "field '{other}' cannot be updated"
                )));
            }
        }
        self.recompute_derived();
        Ok(())
    }
}

/// Fields required to create a tool.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewTooling {
    pub pn: String,
    pub supplier: String,
    pub pn_description: String,
    pub tool_description: String,
    pub tooling_life_qty: f64,
    pub produced: f64,
    pub date_remaining_tooling_life: Option<String>,
    pub annual_volume_forecast: Option<f64>,
    pub date_annual_volume: Option<String>,
}

impl NewTooling {
    pub fn new(pn: impl Into<String>, supplier: impl Into<String>) -> Self {
        Self {
            pn: pn.into(),
            supplier: supplier.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.pn.trim().is_empty() {
            return Err(ToolError::InvalidRecord("PN is required".into()));
        }
        if self.supplier.trim().is_empty() {
            return Err(ToolError::InvalidRecord("supplier is required".into()));
        }
        Ok(())
    }

    /// Builds the record storage will persist, before an id is assigned.
    pub fn into_record(self, comments: String) -> ToolingRecord {
        let mut record = ToolingRecord {
            id: 0,
            pn: self.pn.trim().to_string(),
            supplier: self.supplier.trim().to_string(),
            pn_description: self.pn_description,
            tool_description: self.tool_description,
            tooling_life_qty: self.tooling_life_qty,
            produced: self.produced,
            annual_volume_forecast: self.annual_volume_forecast,
            date_annual_volume: self.date_annual_volume,
            date_remaining_tooling_life: self.date_remaining_tooling_life,
            comments,
            ..ToolingRecord::default()
        };
        record.recompute_derived();
        record
    }
}

/// `max(life − produced, 0)`.
pub fn remaining_life(life: f64, produced: f64) -> f64 {
    (life - produced).max(0.0)
}

/// `produced / life × 100` rounded to one decimal; `0` without a life.
pub fn percent_used(life: f64, produced: f64) -> f64 {
    (percent_used_exact(life, produced) * 10.0).round() / 10.0
}

/// Unrounded `produced / life × 100`, the figure health states compare.
pub fn percent_used_exact(life: f64, produced: f64) -> f64 {
    if life <= 0.0 {
        return 0.0;
    }
    produced / life * 100.0
}

/// Supplier names compare without regard to case or whitespace.
pub fn same_supplier(left: &str, right: &str) -> bool {
    let squash = |name: &str| -> String {
        name.chars()
            .filter(|ch| !ch.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect()
    };
    squash(left) == squash(right)
}

fn optional_date(value: &CellValue) -> Option<String> {
    let iso = normalize::normalize_date(value);
    (!iso.is_empty()).then_some(iso)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_fields_follow_life_and_production() {
        let mut record = ToolingRecord {
            tooling_life_qty: 300.0,
            produced: 100.0,
            ..ToolingRecord::default()
        };
        record.recompute_derived();
        assert_eq!(record.remaining_tooling_life_pcs, 200.0);
        assert_eq!(record.percent_tooling_life, 33.3);

        record.set_field("produced", &CellValue::text("450")).expect("set produced");
        assert_eq!(record.remaining_tooling_life_pcs, 0.0);
        assert_eq!(record.percent_tooling_life, 150.0);
    }

    #[test]
    fn zero_life_has_zero_percent() {
        assert_eq!(percent_used(0.0, 25.0), 0.0);
    }

    #[test]
    fn set_field_normalises_dates_and_ids() {
        let mut record = ToolingRecord::default();
        record
            .set_field("date_annual_volume", &CellValue::text("15/06/2025"))
            .expect("set date");
        assert_eq!(record.date_annual_volume.as_deref(), Some("2025-06-15"));

        record
            .set_field("replacement_tooling_id", &CellValue::text("0"))
            .expect("set replacement");
        assert_eq!(record.replacement_tooling_id, None);

        let error = record
            .set_field("percent_tooling_life", &CellValue::Number(1.0))
            .expect_err("derived field rejected");
        assert!(matches!(error, ToolError::InvalidRecord(_)));
    }

    #[test]
    fn obsolete_status_is_case_insensitive() {
        let record = ToolingRecord {
            status: " Obsolete ".into(),
            ..ToolingRecord::default()
        };
        assert!(record.is_obsolete());
    }

    #[test]
    fn supplier_names_ignore_case_and_spacing() {
        assert!(same_supplier("Acme Tools", " acme  TOOLS"));
        assert!(!same_supplier("Acme", "Acme Two"));
    }

    #[test]
    fn new_tooling_requires_pn_and_supplier() {
        assert!(NewTooling::new("", "ACME").validate().is_err());
        assert!(NewTooling::new("PN-1", " ").validate().is_err());
        assert!(NewTooling::new("PN-1", "ACME").validate().is_ok());
    }
}
