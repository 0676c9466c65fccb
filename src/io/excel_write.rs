use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use rust_xlsxwriter::{
    Color, DataValidation, DataValidationRule, ExcelDateTime, Format, FormatAlign, FormatBorder,
    Formula, Workbook, Worksheet,
};
use tracing::debug;

use crate::config::Settings;
use crate::error::Result;
use crate::forecast;
use crate::layout::{
    self, COL_ANNUAL_VOLUME, COL_ANNUAL_VOLUME_DATE, COL_COMMENTS, COL_EXPIRATION, COL_ID,
    COL_LIFE, COL_PN, COL_PN_DESCRIPTION, COL_PRODUCED, COL_PRODUCTION_DATE, COL_TOOL_DESCRIPTION,
    EXPORTED_AT_LABEL, HEADERS, INSTRUCTIONS, LAST_IMPORT_LABEL, NEVER_IMPORTED,
    SUPPLIER_LABEL, VERIFICATION_LABEL, WorkbookRow,
};
use crate::normalize::{self, date::date_to_serial};

const DATE_FORMAT: &str = "dd/mm/yyyy";
const NUMBER_FORMAT: &str = "#,##0";
/// Width used for date columns, which hold serials rather than text.
const DATE_TEXT_WIDTH: usize = 10;

/// Everything that goes into an outbound supplier workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportWorkbook {
    pub supplier: String,
    pub rows: Vec<WorkbookRow>,
    pub last_import: Option<String>,
    pub exported_at: DateTime<Utc>,
}

/// Writes the workbook to the given path.
pub fn write_workbook(path: &Path, workbook: &ExportWorkbook, settings: &Settings) -> Result<()> {
    let bytes = workbook_to_buffer(workbook, settings)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Serialises the workbook to xlsx bytes.
pub fn workbook_to_buffer(workbook: &ExportWorkbook, settings: &Settings) -> Result<Vec<u8>> {
    let mut workbook_writer = Workbook::new();

    let data_sheet = workbook_writer.add_worksheet();
    write_data_sheet(data_sheet, workbook, settings)?;

    let info_sheet = workbook_writer.add_worksheet();
    write_info_sheet(info_sheet, workbook, settings)?;

    let verification_sheet = workbook_writer.add_worksheet();
    verification_sheet.set_name(&settings.verification_sheet)?;
    verification_sheet.write_string(0, 0, VERIFICATION_LABEL)?;
    verification_sheet.write_string(0, 1, &settings.verification_key)?;
    verification_sheet.set_very_hidden(true);

    debug!(
        rows = workbook.rows.len(),
        padding = settings.padding_rows,
        "workbook constructed"
    );
    Ok(workbook_writer.save_to_buffer()?)
}

struct CellFormats {
    header: Format,
    locked_id: Format,
    locked_text: Format,
    text: Format,
    number: Format,
    date: Format,
    expiration: Format,
}

impl CellFormats {
    fn new() -> Self {
        let centered = Format::new().set_align(FormatAlign::Center);
        Self {
            header: Format::new()
                .set_bold()
                .set_font_color(Color::White)
                .set_background_color(Color::RGB(0x1F4E78))
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter)
                .set_border(FormatBorder::Thin),
            locked_id: centered.clone().set_background_color(Color::RGB(0xE7E6E6)),
            locked_text: Format::new().set_background_color(Color::RGB(0xE7E6E6)),
            text: Format::new().set_unlocked(),
            number: centered.clone().set_num_format(NUMBER_FORMAT).set_unlocked(),
            date: centered.clone().set_num_format(DATE_FORMAT).set_unlocked(),
            expiration: centered
                .set_num_format(DATE_FORMAT)
                .set_background_color(Color::RGB(0xE7E6E6)),
        }
    }
}

fn write_data_sheet(
    worksheet: &mut Worksheet,
    workbook: &ExportWorkbook,
    settings: &Settings,
) -> Result<()> {
    let formats = CellFormats::new();
    worksheet.set_name(&settings.data_sheet)?;

    let mut widths: Vec<usize> = HEADERS.iter().map(|header| header.chars().count()).collect();
    for (col_idx, header) in HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(0, col_idx as u16, *header, &formats.header)?;
    }
    worksheet.set_freeze_panes(1, 0)?;

    let today = workbook.exported_at.date_naive();
    for (row_idx, row) in workbook.rows.iter().enumerate() {
        let sheet_row = (row_idx + 1) as u32;
        write_row(worksheet, sheet_row, Some(row), today, &formats, &mut widths)?;
    }

    let first_padding = workbook.rows.len() as u32 + 1;
    let last_row = first_padding + settings.padding_rows.saturating_sub(1);
    for sheet_row in first_padding..first_padding + settings.padding_rows {
        write_row(worksheet, sheet_row, None, today, &formats, &mut widths)?;
    }

    add_validations(worksheet, last_row.max(1))?;

    for (col_idx, width) in widths.iter().enumerate() {
        worksheet.set_column_width(
            col_idx as u16,
            layout::fitted_width(*width, settings.min_column_width, settings.max_column_width),
        )?;
    }

    worksheet.protect_with_password(&settings.protection_password);
    Ok(())
}

/// Writes one data row; `None` writes an empty row open for a new tool.
fn write_row(
    worksheet: &mut Worksheet,
    sheet_row: u32,
    row: Option<&WorkbookRow>,
    today: NaiveDate,
    formats: &CellFormats,
    widths: &mut [usize],
) -> Result<()> {
    let empty = WorkbookRow::default();
    let data = row.unwrap_or(&empty);
    let mut track = |col: u16, text: &str| {
        let width = &mut widths[usize::from(col)];
        *width = (*width).max(text.chars().count());
    };

    match data.id {
        Some(id) => {
            worksheet.write_number_with_format(sheet_row, COL_ID, id as f64, &formats.locked_id)?;
            track(COL_ID, &id.to_string());
        }
        None => {
            worksheet.write_blank(sheet_row, COL_ID, &formats.locked_id)?;
        }
    }

    // Existing tools keep their PN; rows without an id accept a new one.
    let pn_format = if data.id.is_some() {
        &formats.locked_text
    } else {
        &formats.text
    };
    let text_cells = [
        (COL_PN, data.pn.as_str(), pn_format),
        (COL_PN_DESCRIPTION, data.pn_description.as_str(), &formats.text),
        (COL_TOOL_DESCRIPTION, data.tool_description.as_str(), &formats.text),
        (COL_COMMENTS, data.supplier_comment.as_str(), &formats.text),
    ];
    for (col, text, format) in text_cells {
        write_text(worksheet, sheet_row, col, text, format)?;
        track(col, text);
    }

    let life = row.map(|row| row.tooling_life_qty);
    let produced = row.map(|row| row.produced);
    for (col, value) in [
        (COL_LIFE, life),
        (COL_PRODUCED, produced),
        (COL_ANNUAL_VOLUME, data.annual_volume),
    ] {
        match value {
            Some(number) => {
                worksheet.write_number_with_format(sheet_row, col, number, &formats.number)?;
                track(col, &normalize::format_number(number));
            }
            None => {
                worksheet.write_blank(sheet_row, col, &formats.number)?;
            }
        }
    }

    for (col, value) in [
        (COL_PRODUCTION_DATE, data.production_date),
        (COL_ANNUAL_VOLUME_DATE, data.annual_volume_date),
    ] {
        match value {
            Some(date) => {
                worksheet.write_number_with_format(sheet_row, col, date_to_serial(date), &formats.date)?;
                track(col, &"0".repeat(DATE_TEXT_WIDTH));
            }
            None => {
                worksheet.write_blank(sheet_row, col, &formats.date)?;
            }
        }
    }

    let mut formula = Formula::new(layout::expiration_formula(sheet_row + 1));
    if let Some(row) = row {
        let cached = forecast::compute_expiration(
            row.tooling_life_qty,
            row.produced,
            row.annual_volume,
            row.production_date,
            today,
        );
        if let Some(date) = cached {
            formula = formula.set_result(date_to_serial(date).to_string());
        }
    }
    worksheet.write_formula_with_format(sheet_row, COL_EXPIRATION, formula, &formats.expiration)?;
    track(COL_EXPIRATION, &"0".repeat(DATE_TEXT_WIDTH));
    Ok(())
}

fn write_text(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    text: &str,
    format: &Format,
) -> Result<()> {
    if text.is_empty() {
        worksheet.write_blank(row, col, format)?;
    } else {
        worksheet.write_string_with_format(row, col, text, format)?;
    }
    Ok(())
}

fn add_validations(worksheet: &mut Worksheet, last_row: u32) -> Result<()> {
    let quantity = DataValidation::new()
        .allow_decimal_number(DataValidationRule::Between(0.0, 1.0e12));
    for col in [COL_LIFE, COL_PRODUCED, COL_ANNUAL_VOLUME] {
        worksheet.add_data_validation(1, col, last_row, col, &quantity)?;
    }

    let dates = DataValidation::new().allow_date(DataValidationRule::Between(
        ExcelDateTime::from_ymd(normalize::date::MIN_YEAR as u16, 1, 1)?,
        ExcelDateTime::from_ymd(normalize::date::MAX_YEAR as u16, 12, 31)?,
    ));
    for col in [COL_PRODUCTION_DATE, COL_ANNUAL_VOLUME_DATE] {
        worksheet.add_data_validation(1, col, last_row, col, &dates)?;
    }
    Ok(())
}

fn write_info_sheet(
    worksheet: &mut Worksheet,
    workbook: &ExportWorkbook,
    settings: &Settings,
) -> Result<()> {
    let label = Format::new().set_bold();
    let title = Format::new().set_bold().set_font_size(14);
    worksheet.set_name(&settings.info_sheet)?;

    let exported_at = crate::changes::format_timestamp(workbook.exported_at);
    let rows = [
        (SUPPLIER_LABEL, workbook.supplier.as_str()),
        (
            LAST_IMPORT_LABEL,
            workbook.last_import.as_deref().unwrap_or(NEVER_IMPORTED),
        ),
        (EXPORTED_AT_LABEL, exported_at.as_str()),
    ];
    let mut value_width = 0;
    for (row_idx, (name, value)) in rows.iter().enumerate() {
        worksheet.write_string_with_format(row_idx as u32, 0, *name, &label)?;
        worksheet.write_string(row_idx as u32, 1, *value)?;
        value_width = value_width.max(value.chars().count());
    }

    let instructions_row = rows.len() as u32 + 1;
    worksheet.write_string_with_format(instructions_row, 0, "Instructions", &title)?;
    for (offset, line) in INSTRUCTIONS.iter().enumerate() {
        worksheet.write_string(instructions_row + 1 + offset as u32, 0, *line)?;
    }

    let label_width = rows
        .iter()
        .map(|(name, _)| name.chars().count())
        .max()
        .unwrap_or_default();
    worksheet.set_column_width(
        0,
        layout::fitted_width(label_width, settings.min_column_width, settings.max_column_width),
    )?;
    worksheet.set_column_width(
        1,
        layout::fitted_width(value_width, settings.min_column_width, settings.max_column_width),
    )?;
    worksheet.set_screen_gridlines(false);
    worksheet.protect_with_password(&settings.protection_password);
    Ok(())
}
