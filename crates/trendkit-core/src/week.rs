//! ISO-week period identifiers.
//!
//! A week identifier (`2026-W42`) addresses one weekly report. It is a pure
//! function of the date: every date inside the same ISO week maps to the same
//! identifier.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Upper bound for configured week spans (retention, look-back, history).
pub const MAX_WEEK_SPAN: u32 = 520;

/// One ISO week, Monday through Sunday inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub week: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Week identifier for `date`, using the ISO week-numbering year.
///
/// `2024-12-30` belongs to `2025-W01`; `2027-01-01` belongs to `2026-W53`.
#[must_use]
pub fn get_week_string(date: NaiveDate) -> String {
    let iso = date.iso_week();
    format!("{:04}-W{:02}", iso.year(), iso.week())
}

/// Parse `YYYY-Www` into `(iso_year, week)`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidWeek`] if the string is malformed or the week
/// does not exist in that ISO year.
pub fn parse_week_string(week: &str) -> Result<(i32, u32), ConfigError> {
    let invalid = || ConfigError::InvalidWeek(week.to_string());
    let (year, num) = week.trim().split_once("-W").ok_or_else(invalid)?;
    if year.len() != 4 || num.len() != 2 {
        return Err(invalid());
    }
    let year: i32 = year.parse().map_err(|_| invalid())?;
    let num: u32 = num.parse().map_err(|_| invalid())?;
    NaiveDate::from_isoywd_opt(year, num, Weekday::Mon).ok_or_else(invalid)?;
    Ok((year, num))
}

/// Monday and Sunday of the given week.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidWeek`] for malformed identifiers.
pub fn week_range(week: &str) -> Result<(NaiveDate, NaiveDate), ConfigError> {
    let (year, num) = parse_week_string(week)?;
    let start = NaiveDate::from_isoywd_opt(year, num, Weekday::Mon)
        .ok_or_else(|| ConfigError::InvalidWeek(week.to_string()))?;
    let end = NaiveDate::from_isoywd_opt(year, num, Weekday::Sun)
        .ok_or_else(|| ConfigError::InvalidWeek(week.to_string()))?;
    Ok((start, end))
}

/// The full period containing `date`.
#[must_use]
pub fn period_for(date: NaiveDate) -> Period {
    let start = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
    Period {
        week: get_week_string(date),
        start,
        end: start + Duration::days(6),
    }
}

/// The `n` week identifiers preceding `date`'s week, most recent first.
/// Stops early at the start of the calendar.
#[must_use]
pub fn get_last_n_weeks(date: NaiveDate, n: usize) -> Vec<String> {
    let start = period_for(date).start;
    (1..=n)
        .map_while(|i| {
            let weeks = Duration::try_weeks(i64::try_from(i).ok()?)?;
            start.checked_sub_signed(weeks)
        })
        .map(get_week_string)
        .collect()
}

/// `date` minus `weeks`, saturating at [`NaiveDate::MIN`].
#[must_use]
pub fn weeks_before(date: NaiveDate, weeks: u32) -> NaiveDate {
    Duration::try_weeks(i64::from(weeks))
        .and_then(|d| date.checked_sub_signed(d))
        .unwrap_or(NaiveDate::MIN)
}
