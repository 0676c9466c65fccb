use std::io::Cursor;

use calamine::{DataType, Range, Reader, Xlsx};
use tracing::debug;

use crate::config::Settings;
use crate::error::{Result, ToolError};
use crate::layout::{
    self, DATE_COLUMNS, HEADERS, NUMERIC_COLUMNS, SUPPLIER_LABEL, VERIFICATION_LABEL, WorkbookRow,
};
use crate::model::same_supplier;
use crate::normalize::{self, CellValue};

/// A data row together with its 1-based spreadsheet row number.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    pub number: u32,
    pub row: WorkbookRow,
}

/// Contents of an inbound workbook that passed every structural check.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundWorkbook {
    /// Supplier recorded on the information sheet, if any.
    pub supplier: Option<String>,
    pub rows: Vec<SheetRow>,
}

/// Opens a workbook and runs the structural checks in order: verification
/// sheet, information sheet and supplier, data sheet headers. Any failure
/// aborts before a single row is interpreted.
pub fn read_workbook(bytes: &[u8], supplier: &str, settings: &Settings) -> Result<InboundWorkbook> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;

    verify_origin(&mut workbook, settings)?;

    let info_range = read_required_sheet(&mut workbook, &settings.info_sheet)?;
    let recorded_supplier = info_value(&info_range, SUPPLIER_LABEL);
    if let Some(found) = &recorded_supplier {
        if !same_supplier(found, supplier) {
            return Err(ToolError::SupplierMismatch {
                expected: supplier.to_string(),
                found: found.clone(),
            });
        }
    }

    let data_range = read_required_sheet(&mut workbook, &settings.data_sheet)?;
    let headers: Vec<String> = match data_range.rows().next() {
        Some(first_row) => first_row
            .iter()
            .map(|cell| cell_to_string(Some(cell)))
            .collect(),
        None => Vec::new(),
    };
    layout::verify_headers(&settings.data_sheet, &headers)?;

    let mut rows = Vec::new();
    for (row_idx, row) in data_range.rows().enumerate().skip(1) {
        let number = (row_idx + 1) as u32;
        let cells: Vec<CellValue> = (0..HEADERS.len())
            .map(|col_idx| CellValue::from(row.get(col_idx)))
            .collect();
        let parsed = WorkbookRow::from_cells(&cells);
        log_neutralised(number, &cells);
        rows.push(SheetRow { number, row: parsed });
    }

    debug!(rows = rows.len(), "read data sheet");
    Ok(InboundWorkbook {
        supplier: recorded_supplier,
        rows,
    })
}

fn verify_origin<R: std::io::Read + std::io::Seek>(
    workbook: &mut Xlsx<R>,
    settings: &Settings,
) -> Result<()> {
    let range = match workbook.worksheet_range(&settings.verification_sheet) {
        Some(range) => range?,
        None => {
            return Err(ToolError::VerificationFailed(format!(
                "sheet '{}' is missing; the file was not exported by this tool",
                settings.verification_sheet
            )));
        }
    };
    let first_row = range.rows().next();
    let label = cell_to_string(first_row.and_then(|row| row.first()));
    let key = cell_to_string(first_row.and_then(|row| row.get(1)));
    if label != VERIFICATION_LABEL || key != settings.verification_key {
        return Err(ToolError::VerificationFailed(
            "verification key does not match".to_string(),
        ));
    }
    Ok(())
}

fn read_required_sheet<R: std::io::Read + std::io::Seek>(
    workbook: &mut Xlsx<R>,
    name: &str,
) -> Result<Range<DataType>> {
    let range_result = workbook
        .worksheet_range(name)
        .ok_or_else(|| ToolError::InvalidWorkbook(format!("missing sheet '{name}'")))?;
    let range = range_result.map_err(ToolError::from)?;
    Ok(range)
}

/// Value next to `label` on a two-column label/value sheet.
fn info_value(range: &Range<DataType>, label: &str) -> Option<String> {
    range
        .rows()
        .find(|row| cell_to_string(row.first()).trim() == label)
        .map(|row| cell_to_string(row.get(1)).trim().to_string())
        .filter(|value| !value.is_empty())
}

fn log_neutralised(number: u32, cells: &[CellValue]) {
    for col in NUMERIC_COLUMNS {
        let cell = &cells[usize::from(col)];
        if !cell.is_blank() && normalize::parse_number_opt(cell).is_none() {
            debug!(
                row = number,
                column = HEADERS[usize::from(col)],
                raw = %cell.as_plain_text(),
                "unreadable number treated as empty"
            );
        }
    }
    for col in DATE_COLUMNS {
        if col == layout::COL_EXPIRATION {
            continue;
        }
        let cell = &cells[usize::from(col)];
        if !cell.is_blank() && normalize::parse_date(cell).is_none() {
            debug!(
                row = number,
                column = HEADERS[usize::from(col)],
                raw = %cell.as_plain_text(),
                "unreadable date treated as empty"
            );
        }
    }
}

fn cell_to_string(cell: Option<&DataType>) -> String {
    match cell {
        Some(DataType::String(value)) => value.clone(),
        Some(DataType::Float(value)) => value.to_string(),
        Some(DataType::Int(value)) => value.to_string(),
        Some(DataType::Bool(value)) => value.to_string(),
        Some(DataType::Empty) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
