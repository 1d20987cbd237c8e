use crate::error::{ConsolidationError, Result};
use crate::period::{ElementaryPeriod, PeriodRange};
use chrono::NaiveDate;

/// First calendar month of the fiscal year (April). A fiscal year runs April(N) to March(N+1).
pub const FISCAL_YEAR_START_MONTH: u32 = 4;

/// Parses a strict `"YYYY-MM"` string.
///
/// This is a validation predicate: anything that is not exactly four year digits, a dash and
/// two month digits in `01..=12` yields `None`.
pub fn parse_period(period: &str) -> Option<ElementaryPeriod> {
    let bytes = period.as_bytes();
    if bytes.len() != 7 || bytes[4] != b'-' {
        return None;
    }

    let (year_str, month_str) = (&period[..4], &period[5..]);
    if !year_str.bytes().all(|b| b.is_ascii_digit()) || !month_str.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let year: i32 = year_str.parse().ok()?;
    let month: u32 = month_str.parse().ok()?;

    ElementaryPeriod::new(year, month)
}

/// Expands the inclusive range `desde..=hasta` into elementary months.
///
/// Both endpoints must parse with [`parse_period`] and `desde` must not come after `hasta`.
pub fn build_month_range(desde: &str, hasta: &str) -> Result<PeriodRange> {
    let start = parse_period(desde).ok_or_else(|| {
        ConsolidationError::InvalidInput(format!(
            "Invalid start period '{}'. Expected YYYY-MM",
            desde
        ))
    })?;
    let end = parse_period(hasta).ok_or_else(|| {
        ConsolidationError::InvalidInput(format!(
            "Invalid end period '{}'. Expected YYYY-MM",
            hasta
        ))
    })?;

    PeriodRange::new(start, end)
}

pub fn next_month(period: ElementaryPeriod) -> ElementaryPeriod {
    if period.month == 12 {
        ElementaryPeriod {
            year: period.year + 1,
            month: 1,
        }
    } else {
        ElementaryPeriod {
            year: period.year,
            month: period.month + 1,
        }
    }
}

pub fn months_between(start: ElementaryPeriod, end: ElementaryPeriod) -> i32 {
    let year_diff = end.year - start.year;
    let month_diff = end.month as i32 - start.month as i32;
    year_diff * 12 + month_diff
}

/// Returns the months from `start` to `end` inclusive, or an empty list when `start > end`.
pub fn get_months_in_period(start: ElementaryPeriod, end: ElementaryPeriod) -> Vec<ElementaryPeriod> {
    let span = months_between(start, end);
    if span < 0 {
        return Vec::new();
    }

    let mut months = Vec::with_capacity(span as usize + 1);
    let mut current = start;
    while current <= end {
        months.push(current);
        current = next_month(current);
    }

    months
}

/// Calendar quarter (1..=4) of a month.
pub fn quarter_of(month: u32) -> u32 {
    month.div_ceil(3)
}

/// Year in which the fiscal year containing this month started.
///
/// # Examples
/// - 2024-03 belongs to the fiscal year starting in 2023
/// - 2024-04 belongs to the fiscal year starting in 2024
pub fn fiscal_year_of(period: ElementaryPeriod) -> i32 {
    if period.month >= FISCAL_YEAR_START_MONTH {
        period.year
    } else {
        period.year - 1
    }
}

/// Last calendar day of the month, e.g. for labelling a balance sheet snapshot.
pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}
