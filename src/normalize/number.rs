use std::sync::LazyLock;

use regex::Regex;

use super::cell::CellValue;
use super::date;

/// `1.234.567` style grouping with dots.
static DOT_GROUPED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d{1,3}(\.\d{3})+$").expect("valid regex"));
/// `1,234,567` style grouping with commas.
static COMMA_GROUPED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d{1,3}(,\d{3})+$").expect("valid regex"));

/// Parses a number written with either Brazilian (`1.234,56`) or
/// international (`1,234.56`) separators. Never fails: anything without a
/// usable number reads as `0`.
pub fn parse_localized_number(value: &CellValue) -> f64 {
    parse_number_opt(value).unwrap_or(0.0)
}

/// Like [`parse_localized_number`] but distinguishes "no number here" from zero.
pub fn parse_number_opt(value: &CellValue) -> Option<f64> {
    let parsed = match value.resolved() {
        CellValue::Empty | CellValue::Error(_) => None,
        CellValue::Number(number) | CellValue::DateSerial(number) => Some(*number),
        CellValue::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        CellValue::Date(value) => Some(date::date_to_serial(*value)),
        CellValue::Text(text) => parse_number_text(text),
        CellValue::RichText(runs) => parse_number_text(&runs.concat()),
        CellValue::Formula { .. } => None,
    };
    parsed.filter(|number| number.is_finite())
}

/// Text form of the localized number parser.
pub fn parse_number_text(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|ch| ch.is_ascii_digit() || matches!(ch, '.' | ',' | '-'))
        .collect();
    if !cleaned.chars().any(|ch| ch.is_ascii_digit()) {
        return None;
    }

    if DOT_GROUPED.is_match(&cleaned) || COMMA_GROUPED.is_match(&cleaned) {
        let digits: String = cleaned.chars().filter(|ch| !matches!(ch, '.' | ',')).collect();
        return digits.parse::<f64>().ok();
    }

    if let Some(position) = cleaned.rfind(['.', ',']) {
        let (integer_part, fraction_part) = (&cleaned[..position], &cleaned[position + 1..]);
        let negative = integer_part.starts_with('-');
        let integer_digits: String = integer_part.chars().filter(char::is_ascii_digit).collect();
        let fraction_digits: String = fraction_part.chars().filter(char::is_ascii_digit).collect();
        let literal = format!(
            "{}{}.{}",
            if negative { "-" } else { "" },
            if integer_digits.is_empty() { "0" } else { &integer_digits },
            if fraction_digits.is_empty() { "0" } else { &fraction_digits },
        );
        if let Ok(number) = literal.parse::<f64>() {
            return Some(number);
        }
    }

    let fallback: String = cleaned
        .chars()
        .filter(|ch| ch.is_ascii_digit() || *ch == '-')
        .collect();
    fallback.parse::<f64>().ok()
}

/// Representation used when comparing two numbers for equality.
pub fn canonical_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Formats a number for people: `.` thousands grouping, `,` decimal
/// separator, between zero and two decimals.
pub fn format_number(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    let fixed = format!("{:.2}", rounded.abs());
    let (integer, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let fraction = fraction.trim_end_matches('0');

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (index, digit) in integer.chars().enumerate() {
        if index > 0 && (integer.len() - index) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    let sign = if rounded < 0.0 { "-" } else { "" };
    if fraction.is_empty() {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped},{fraction}")
    }
}
