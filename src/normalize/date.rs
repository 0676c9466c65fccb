use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime};
use regex::Regex;

use super::cell::CellValue;

/// Earliest year accepted from any source.
pub const MIN_YEAR: i32 = 1900;
/// Latest year accepted from any source.
pub const MAX_YEAR: i32 = 2200;
/// Serial numbers outside this range are not treated as dates.
pub const MIN_SERIAL: f64 = 1.0;
pub const MAX_SERIAL: f64 = 100_000.0;

static NUMERIC_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("valid regex"));
static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})-(\d{2})-(\d{2})(?:[T ].*)?$").expect("valid regex")
});
static SLASH_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").expect("valid regex"));

/// Formats tried, in order, once the structured formats did not match.
const FALLBACK_FORMATS: &[&str] = &[
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d %Y",
    "%b %d, %Y",
    "%B %d, %Y",
];
const FALLBACK_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S"];

fn spreadsheet_epoch() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1899, 12, 30)
}

fn within_bounds(date: NaiveDate) -> Option<NaiveDate> {
    (MIN_YEAR..=MAX_YEAR).contains(&date.year()).then_some(date)
}

/// Converts a spreadsheet date serial to a calendar date. The time-of-day
/// fraction is dropped.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !(MIN_SERIAL..=MAX_SERIAL).contains(&serial) {
        return None;
    }
    let date = spreadsheet_epoch()?.checked_add_signed(Duration::days(serial.floor() as i64))?;
    within_bounds(date)
}

/// Converts a calendar date to its spreadsheet serial.
pub fn date_to_serial(date: NaiveDate) -> f64 {
    spreadsheet_epoch()
        .map(|epoch| (date - epoch).num_days() as f64)
        .unwrap_or_default()
}

/// Canonical storage form, `YYYY-MM-DD`.
pub fn to_iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Display form, `DD/MM/YYYY`.
pub fn to_display(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Lenient date reading used for display and import. Accepts date values,
/// serials, ISO text, `DD/MM/YYYY` text and a handful of common textual
/// layouts. Returns `None` rather than failing.
pub fn parse_date(value: &CellValue) -> Option<NaiveDate> {
    match value.resolved() {
        CellValue::Date(date) => within_bounds(*date),
        CellValue::DateSerial(serial) | CellValue::Number(serial) => serial_to_date(*serial),
        CellValue::Text(text) => parse_date_text(text),
        CellValue::RichText(runs) => parse_date_text(&runs.concat()),
        _ => None,
    }
}

/// Text form of [`parse_date`].
pub fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if NUMERIC_TEXT.is_match(trimmed) {
        return trimmed.parse::<f64>().ok().and_then(serial_to_date);
    }
    if let Some(date) = parse_iso(trimmed) {
        return within_bounds(date);
    }
    if let Some(date) = parse_day_first(trimmed) {
        return within_bounds(date);
    }
    parse_fallback(trimmed).and_then(within_bounds)
}

/// Strict reading used when comparing stored and incoming dates: only
/// serials, ISO and `DD/MM/YYYY` are accepted.
pub fn parse_date_strict(value: &CellValue) -> Option<NaiveDate> {
    match value.resolved() {
        CellValue::Date(date) => within_bounds(*date),
        CellValue::DateSerial(serial) | CellValue::Number(serial) => serial_to_date(*serial),
        CellValue::Text(text) => parse_date_text_strict(text),
        CellValue::RichText(runs) => parse_date_text_strict(&runs.concat()),
        _ => None,
    }
}

fn parse_date_text_strict(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let date = if NUMERIC_TEXT.is_match(trimmed) {
        trimmed.parse::<f64>().ok().and_then(serial_to_date)
    } else if ISO_DATE.is_match(trimmed) {
        parse_iso(trimmed)
    } else {
        parse_day_first(trimmed)
    };
    date.and_then(within_bounds)
}

/// ISO text, or an empty string when the value is not a date.
pub fn normalize_date(value: &CellValue) -> String {
    parse_date(value).map(to_iso).unwrap_or_default()
}

/// Strict counterpart of [`normalize_date`].
pub fn normalize_date_strict(value: &CellValue) -> String {
    parse_date_strict(value).map(to_iso).unwrap_or_default()
}

/// `DD/MM/YYYY`, or an empty string when the value is not a date.
pub fn format_display_date(value: &CellValue) -> String {
    parse_date(value).map(to_display).unwrap_or_default()
}

fn parse_iso(text: &str) -> Option<NaiveDate> {
    let captures = ISO_DATE.captures(text)?;
    let year = captures[1].parse().ok()?;
    let month = captures[2].parse().ok()?;
    let day = captures[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// `DD/MM/YYYY`; only when both leading parts could be a day.
fn parse_day_first(text: &str) -> Option<NaiveDate> {
    let captures = SLASH_DATE.captures(text)?;
    let first: u32 = captures[1].parse().ok()?;
    let second: u32 = captures[2].parse().ok()?;
    let year: i32 = captures[3].parse().ok()?;
    if first > 31 || second > 31 {
        return None;
    }
    NaiveDate::from_ymd_opt(year, second, first)
}

fn parse_fallback(text: &str) -> Option<NaiveDate> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.naive_utc().date());
    }
    FALLBACK_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|parsed| parsed.date())
        .or_else(|| {
            FALLBACK_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        })
}
