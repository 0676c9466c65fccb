//! Value normalisation for spreadsheet cells and user input.
//!
//! Parsing never fails: a value that cannot be read as a number becomes `0`
//! (or "absent" through the `_opt` variants) and a value that cannot be read
//! as a date becomes empty. Only structural workbook problems abort an import.

pub mod cell;
pub mod date;
pub mod number;

pub use cell::CellValue;
pub use date::{
    format_display_date, normalize_date, normalize_date_strict, parse_date, parse_date_strict,
    to_display, to_iso,
};
pub use number::{format_number, parse_localized_number, parse_number_opt};

/// Number stored for a cell: the localized reading, `0` when unreadable.
pub fn normalize_number(value: &CellValue) -> f64 {
    parse_localized_number(value)
}
