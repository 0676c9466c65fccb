use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, ToolError};

/// Name of the sheet holding one row per tooling record.
pub const DEFAULT_DATA_SHEET: &str = "Tooling";
/// Name of the supplier-facing information sheet.
pub const DEFAULT_INFO_SHEET: &str = "Info & Instructions";
/// Name of the very hidden sheet used to recognise our own exports.
pub const DEFAULT_VERIFICATION_SHEET: &str = "_verification";
/// Value stored in B1 of the verification sheet.
pub const DEFAULT_VERIFICATION_KEY: &str = "tooling-sync:7c1f4e92-export-v1";
/// Password applied to the protected sheets.
pub const DEFAULT_PROTECTION_PASSWORD: &str = "tooling-sync";
/// Blank rows appended below the exported records for new entries.
pub const DEFAULT_PADDING_ROWS: u32 = 100;

/// Workbook and layout settings shared by export and import.
///
/// Every field has a default, so a settings file only needs to list the
/// values it overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data_sheet: String,
    pub info_sheet: String,
    pub verification_sheet: String,
    pub verification_key: String,
    pub protection_password: String,
    pub padding_rows: u32,
    pub min_column_width: f64,
    pub max_column_width: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_sheet: DEFAULT_DATA_SHEET.to_string(),
            info_sheet: DEFAULT_INFO_SHEET.to_string(),
            verification_sheet: DEFAULT_VERIFICATION_SHEET.to_string(),
            verification_key: DEFAULT_VERIFICATION_KEY.to_string(),
            protection_password: DEFAULT_PROTECTION_PASSWORD.to_string(),
            padding_rows: DEFAULT_PADDING_ROWS,
            min_column_width: 10.0,
            max_column_width: 60.0,
        }
    }
}

impl Settings {
    /// Loads settings from a JSON file, filling unspecified keys with defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ToolError::MissingInput(path.to_path_buf()));
        }
        let raw = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&raw)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("data_sheet", &self.data_sheet),
            ("info_sheet", &self.info_sheet),
            ("verification_sheet", &self.verification_sheet),
        ] {
            if value.trim().is_empty() || value.chars().count() > 31 {
                return Err(ToolError::Config(format!(
                    "{name} must be between 1 and 31 characters"
                )));
            }
        }
        if self.verification_key.is_empty() {
            return Err(ToolError::Config("verification_key must not be empty".into()));
        }
        if self.min_column_width <= 0.0 || self.min_column_width > self.max_column_width {
            return Err(ToolError::Config(
                "column width bounds must satisfy 0 < min <= max".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"padding_rows": 5, "data_sheet": "Tools"}}"#).expect("write");

        let settings = Settings::load(file.path()).expect("settings load");
        assert_eq!(settings.padding_rows, 5);
        assert_eq!(settings.data_sheet, "Tools");
        assert_eq!(settings.info_sheet, DEFAULT_INFO_SHEET);
    }

    #[test]
    fn overlong_sheet_name_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"info_sheet": "{}"}}"#, "x".repeat(40)).expect("write");

        let error = Settings::load(file.path()).expect_err("should reject");
        assert!(matches!(error, ToolError::Config(_)));
    }
}
