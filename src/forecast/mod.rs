//! Expiration forecasting and health classification.
//!
//! The same algorithm is emitted as a live formula by
//! [`crate::layout::expiration_formula`]; the two must stay in step.

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::model::{ToolingRecord, percent_used, percent_used_exact};
use crate::normalize::{self, CellValue};

/// Expirations up to this many days away are a warning.
pub const WARNING_WINDOW_DAYS: i64 = 730;
/// Upper bound of the middle reporting tier.
pub const LONG_HORIZON_DAYS: i64 = 1825;
/// Days in the forecast year.
pub const DAYS_PER_YEAR: f64 = 365.0;

/// Projects the date a tool runs out of life.
///
/// * nothing left: the base date itself
/// * no annual volume: remaining units are counted as days
/// * otherwise: `remaining / forecast × 365` days after the base date
///
/// The base date is the production measurement date, or `today` without one.
/// Non-finite inputs yield `None`.
pub fn compute_expiration(
    life: f64,
    produced: f64,
    forecast: Option<f64>,
    production_date: Option<NaiveDate>,
    today: NaiveDate,
) -> Option<NaiveDate> {
    let remaining = life - produced;
    if !remaining.is_finite() {
        return None;
    }
    let base = production_date.unwrap_or(today);
    if remaining <= 0.0 {
        return Some(base);
    }

    let forecast = forecast.unwrap_or(0.0);
    if forecast.is_nan() {
        return None;
    }
    let total_days = if forecast <= 0.0 {
        remaining.round()
    } else {
        (remaining / forecast * DAYS_PER_YEAR).round()
    };
    if !total_days.is_finite() {
        return None;
    }
    base.checked_add_signed(Duration::try_days(total_days as i64)?)
}

/// [`compute_expiration`] over loosely typed inputs, returning ISO text or an
/// empty string.
pub fn compute_expiration_iso(
    life: &CellValue,
    produced: &CellValue,
    forecast: &CellValue,
    production_date: &CellValue,
    today: NaiveDate,
) -> String {
    compute_expiration(
        normalize::normalize_number(life),
        normalize::normalize_number(produced),
        normalize::parse_number_opt(forecast),
        normalize::parse_date(production_date),
        today,
    )
    .map(normalize::to_iso)
    .unwrap_or_default()
}

/// The stored expiration date when it parses, otherwise the forecast.
pub fn resolve_expiration(record: &ToolingRecord, today: NaiveDate) -> Option<NaiveDate> {
    let stored = record
        .expiration_date
        .as_deref()
        .and_then(|value| normalize::parse_date_strict(&CellValue::from(value)));
    if stored.is_some() {
        return stored;
    }
    let production_date = record
        .date_remaining_tooling_life
        .as_deref()
        .and_then(|value| normalize::parse_date(&CellValue::from(value)));
    compute_expiration(
        record.tooling_life_qty,
        record.produced,
        record.annual_volume_forecast,
        production_date,
        today,
    )
}

/// Health of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HealthState {
    Ok,
    Warning,
    Expired,
    Obsolete,
    ObsoleteReplaced,
}

impl HealthState {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthState::Ok => "ok",
            HealthState::Warning => "warning",
            HealthState::Expired => "expired",
            HealthState::Obsolete => "obsolete",
            HealthState::ObsoleteReplaced => "obsolete-replaced",
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reporting buckets used by exports and the status summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpirationTier {
    Expired,
    WithinTwoYears,
    WithinFiveYears,
    BeyondFiveYears,
    Unscheduled,
    Obsolete,
}

/// Result of [`classify`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub state: HealthState,
    pub expiration_date: Option<NaiveDate>,
    pub diff_days: Option<i64>,
    pub percent_used: f64,
}

impl Classification {
    pub fn tier(&self) -> ExpirationTier {
        match self.state {
            HealthState::Obsolete | HealthState::ObsoleteReplaced => ExpirationTier::Obsolete,
            HealthState::Expired => ExpirationTier::Expired,
            HealthState::Warning => ExpirationTier::WithinTwoYears,
            HealthState::Ok => match self.diff_days {
                Some(days) if days <= LONG_HORIZON_DAYS => ExpirationTier::WithinFiveYears,
                Some(_) => ExpirationTier::BeyondFiveYears,
                None => ExpirationTier::Unscheduled,
            },
        }
    }
}

/// Classifies a tool as of `today`.
///
/// Usage exhaustion is checked before the date: a tool at 100 % is expired
/// even when its nominal expiration lies in the future. The check uses the
/// unrounded ratio; `percent_used` in the result is rounded for display.
pub fn classify(record: &ToolingRecord, today: NaiveDate) -> Classification {
    let percent = percent_used(record.tooling_life_qty, record.produced);
    let exact = percent_used_exact(record.tooling_life_qty, record.produced);
    if record.is_obsolete() {
        let state = if record.replacement().is_some() {
            HealthState::ObsoleteReplaced
        } else {
            HealthState::Obsolete
        };
        return Classification {
            state,
            expiration_date: None,
            diff_days: None,
            percent_used: percent,
        };
    }

    let expiration_date = resolve_expiration(record, today);
    let diff_days = expiration_date.map(|date| (date - today).num_days());
    Classification {
        state: state_for(exact, diff_days),
        expiration_date,
        diff_days,
        percent_used: percent,
    }
}

fn state_for(percent: f64, diff_days: Option<i64>) -> HealthState {
    match diff_days {
        _ if percent >= 100.0 => HealthState::Expired,
        Some(days) if days < 0 => HealthState::Expired,
        Some(days) if days <= WARNING_WINDOW_DAYS => HealthState::Warning,
        _ => HealthState::Ok,
    }
}

/// Count of tools per reporting tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TierSummary {
    pub expired: usize,
    pub within_two_years: usize,
    pub within_five_years: usize,
    pub beyond_five_years: usize,
    pub unscheduled: usize,
    pub obsolete: usize,
}

impl TierSummary {
    pub fn total(&self) -> usize {
        self.expired
            + self.within_two_years
            + self.within_five_years
            + self.beyond_five_years
            + self.unscheduled
            + self.obsolete
    }

    fn add(&mut self, tier: ExpirationTier) {
        let slot = match tier {
            ExpirationTier::Expired => &mut self.expired,
            ExpirationTier::WithinTwoYears => &mut self.within_two_years,
            ExpirationTier::WithinFiveYears => &mut self.within_five_years,
            ExpirationTier::BeyondFiveYears => &mut self.beyond_five_years,
            ExpirationTier::Unscheduled => &mut self.unscheduled,
            ExpirationTier::Obsolete => &mut self.obsolete,
        };
        *slot += 1;
    }
}

/// Buckets every record into its reporting tier.
pub fn summarize(records: &[ToolingRecord], today: NaiveDate) -> TierSummary {
    let mut summary = TierSummary::default();
    for record in records {
        summary.add(classify(record, today).tier());
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn tool(life: f64, produced: f64) -> ToolingRecord {
        ToolingRecord {
            id: 1,
            tooling_life_qty: life,
            produced,
            ..ToolingRecord::default()
        }
    }

    #[test]
    fn exhausted_tool_expires_on_production_date() {
        let base = ymd(2024, 5, 10);
        let today = ymd(2026, 1, 1);
        assert_eq!(compute_expiration(100.0, 100.0, Some(5000.0), Some(base), today), Some(base));
        assert_eq!(compute_expiration(100.0, 150.0, None, Some(base), today), Some(base));
    }

    #[test]
    fn unknown_volume_counts_units_as_days() {
        let base = ymd(2024, 1, 1);
        assert_eq!(
            compute_expiration(100.0, 50.0, Some(0.0), Some(base), base),
            Some(ymd(2024, 2, 20))
        );
        assert_eq!(
            compute_expiration(100.0, 50.0, None, Some(base), base),
            Some(ymd(2024, 2, 20))
        );
    }

    #[test]
    fn forecast_scales_remaining_life_to_days() {
        let base = ymd(2023, 3, 1);
        assert_eq!(
            compute_expiration(365.0, 0.0, Some(365.0), Some(base), base),
            Some(ymd(2024, 2, 29))
        );
        assert_eq!(
            compute_expiration(1000.0, 500.0, Some(1000.0), Some(base), base),
            base.checked_add_signed(Duration::days(183))
        );
    }

    #[test]
    fn missing_production_date_uses_today() {
        let today = ymd(2025, 7, 1);
        assert_eq!(compute_expiration(10.0, 0.0, None, None, today), Some(ymd(2025, 7, 11)));
    }

    #[test]
    fn nan_inputs_have_no_expiration() {
        let today = ymd(2025, 7, 1);
        assert_eq!(compute_expiration(f64::NAN, 0.0, None, None, today), None);
        assert_eq!(compute_expiration(10.0, 0.0, Some(f64::NAN), None, today), None);
        assert_eq!(
            compute_expiration_iso(
                &CellValue::text("10"),
                &CellValue::Empty,
                &CellValue::Empty,
                &CellValue::text("01/07/2025"),
                today
            ),
            "2025-07-11"
        );
    }

    #[test]
    fn stored_expiration_wins() {
        let mut record = tool(100.0, 0.0);
        record.expiration_date = Some("2030-01-01".into());
        assert_eq!(resolve_expiration(&record, ymd(2025, 1, 1)), Some(ymd(2030, 1, 1)));

        record.expiration_date = Some("not a date".into());
        assert_eq!(resolve_expiration(&record, ymd(2025, 1, 1)), Some(ymd(2025, 4, 11)));
    }

    #[test]
    fn usage_exhaustion_beats_future_date() {
        let today = ymd(2025, 1, 1);
        let mut record = tool(100.0, 100.0);
        record.expiration_date = Some("2025-01-11".into());
        let classification = classify(&record, today);
        assert_eq!(classification.diff_days, Some(10));
        assert_eq!(classification.state, HealthState::Expired);
    }

    #[test]
    fn nearly_exhausted_tool_is_not_expired() {
        let today = ymd(2025, 1, 1);
        let mut record = tool(10_000.0, 9_996.0);
        record.expiration_date = Some("2030-01-01".into());
        let classification = classify(&record, today);
        assert_eq!(classification.percent_used, 100.0);
        assert_eq!(classification.diff_days, Some(1826));
        assert_eq!(classification.state, HealthState::Ok);
    }

    #[test]
    fn day_windows() {
        let today = ymd(2025, 1, 1);
        let mut record = tool(1000.0, 0.0);

        record.expiration_date = normalize_days(today, 400);
        assert_eq!(classify(&record, today).state, HealthState::Warning);

        record.expiration_date = normalize_days(today, 0);
        assert_eq!(classify(&record, today).state, HealthState::Warning);

        record.expiration_date = normalize_days(today, -1);
        assert_eq!(classify(&record, today).state, HealthState::Expired);

        record.expiration_date = normalize_days(today, 2000);
        let classification = classify(&record, today);
        assert_eq!(classification.state, HealthState::Ok);
        assert_eq!(classification.tier(), ExpirationTier::BeyondFiveYears);

        record.expiration_date = normalize_days(today, 731);
        assert_eq!(classify(&record, today).tier(), ExpirationTier::WithinFiveYears);
    }

    #[test]
    fn obsolete_tools_skip_the_forecast() {
        let today = ymd(2025, 1, 1);
        let mut record = tool(100.0, 100.0);
        record.status = "Obsolete".into();
        record.replacement_tooling_id = Some(5);
        let classification = classify(&record, today);
        assert_eq!(classification.state, HealthState::ObsoleteReplaced);
        assert_eq!(classification.diff_days, None);

        record.replacement_tooling_id = None;
        assert_eq!(classify(&record, today).state, HealthState::Obsolete);
    }

    #[test]
    fn summary_counts_each_tier() {
        let today = ymd(2025, 1, 1);
        let mut obsolete = tool(10.0, 0.0);
        obsolete.status = "obsolete".into();
        let records = vec![tool(100.0, 100.0), tool(100.0, 0.0), tool(5000.0, 0.0), obsolete];

        let summary = summarize(&records, today);
        assert_eq!(summary.expired, 1);
        assert_eq!(summary.within_two_years, 1);
        assert_eq!(summary.beyond_five_years, 1);
        assert_eq!(summary.obsolete, 1);
        assert_eq!(summary.total(), 4);
    }

    fn normalize_days(today: NaiveDate, days: i64) -> Option<String> {
        Some(normalize::to_iso(today + Duration::days(days)))
    }
}
