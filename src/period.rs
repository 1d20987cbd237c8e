use crate::error::{ConsolidationError, Result};
use crate::schema::Granularity;
use crate::utils::{
    fiscal_year_of, get_months_in_period, last_day_of_month, parse_period, quarter_of,
    FISCAL_YEAR_START_MONTH,
};
use chrono::{Datelike, NaiveDate};
use schemars::JsonSchema;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single `(year, month)`: the finest unit of consolidation.
///
/// Deserialization rejects months outside `1..=12`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, JsonSchema)]
pub struct ElementaryPeriod {
    pub year: i32,
    /// 1 = January ... 12 = December
    pub month: u32,
}

impl ElementaryPeriod {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn month_end(&self) -> Option<NaiveDate> {
        last_day_of_month(self.year, self.month)
    }
}

impl<'de> Deserialize<'de> for ElementaryPeriod {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            year: i32,
            month: u32,
        }

        let raw = Raw::deserialize(deserializer)?;
        ElementaryPeriod::new(raw.year, raw.month).ok_or_else(|| {
            de::Error::custom(format!("month {} is outside 1..=12", raw.month))
        })
    }
}

impl fmt::Display for ElementaryPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for ElementaryPeriod {
    type Err = ConsolidationError;

    fn from_str(s: &str) -> Result<Self> {
        parse_period(s).ok_or_else(|| {
            ConsolidationError::InvalidInput(format!("Invalid period '{}'. Expected YYYY-MM", s))
        })
    }
}

/// A contiguous, non-empty, strictly increasing run of months from `start` to `end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodRange {
    start: ElementaryPeriod,
    end: ElementaryPeriod,
    months: Vec<ElementaryPeriod>,
}

impl PeriodRange {
    pub fn new(start: ElementaryPeriod, end: ElementaryPeriod) -> Result<Self> {
        for period in [start, end] {
            if ElementaryPeriod::new(period.year, period.month).is_none() {
                return Err(ConsolidationError::InvalidInput(format!(
                    "Period {}-{} has a month outside 1..=12",
                    period.year, period.month
                )));
            }
        }

        if start > end {
            return Err(ConsolidationError::InvalidInput(format!(
                "Start period {} is after end period {}",
                start, end
            )));
        }

        let months = get_months_in_period(start, end);
        Ok(Self { start, end, months })
    }

    pub fn start(&self) -> ElementaryPeriod {
        self.start
    }

    pub fn end(&self) -> ElementaryPeriod {
        self.end
    }

    pub fn months(&self) -> &[ElementaryPeriod] {
        &self.months
    }

    pub fn len(&self) -> usize {
        self.months.len()
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }
}

/// Label of an aggregation bucket.
///
/// Formats as `"YYYY-MM"`, `"YYYY-Qn"` or `"N-(N+1)"` (April–March fiscal year).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupKey {
    Month(ElementaryPeriod),
    Quarter { year: i32, quarter: u32 },
    FiscalYear { start_year: i32 },
}

impl GroupKey {
    pub fn for_period(granularity: Granularity, period: ElementaryPeriod) -> Self {
        match granularity {
            Granularity::Monthly => GroupKey::Month(period),
            Granularity::Quarterly => GroupKey::Quarter {
                year: period.year,
                quarter: quarter_of(period.month),
            },
            Granularity::FiscalYear => GroupKey::FiscalYear {
                start_year: fiscal_year_of(period),
            },
        }
    }

    /// First elementary month covered by the bucket.
    pub fn first_month(&self) -> ElementaryPeriod {
        match *self {
            GroupKey::Month(period) => period,
            GroupKey::Quarter { year, quarter } => ElementaryPeriod {
                year,
                month: (quarter - 1) * 3 + 1,
            },
            GroupKey::FiscalYear { start_year } => ElementaryPeriod {
                year: start_year,
                month: FISCAL_YEAR_START_MONTH,
            },
        }
    }

    /// Last elementary month covered by the bucket (its balance sheet closing month).
    pub fn last_month(&self) -> ElementaryPeriod {
        match *self {
            GroupKey::Month(period) => period,
            GroupKey::Quarter { year, quarter } => ElementaryPeriod {
                year,
                month: quarter * 3,
            },
            GroupKey::FiscalYear { start_year } => ElementaryPeriod {
                year: start_year + 1,
                month: FISCAL_YEAR_START_MONTH - 1,
            },
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Month(period) => write!(f, "{}", period),
            GroupKey::Quarter { year, quarter } => write!(f, "{:04}-Q{}", year, quarter),
            GroupKey::FiscalYear { start_year } => {
                write!(f, "{:04}-{:04}", start_year, start_year + 1)
            }
        }
    }
}

impl FromStr for GroupKey {
    type Err = ConsolidationError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ConsolidationError::InvalidInput(format!("Invalid period key '{}'", s));

        let (head, tail) = s.split_once('-').ok_or_else(invalid)?;
        if head.len() != 4 || !head.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let year: i32 = head.parse().map_err(|_| invalid())?;

        if let Some(q) = tail.strip_prefix('Q') {
            let quarter: u32 = q.parse().map_err(|_| invalid())?;
            if q.len() != 1 || !(1..=4).contains(&quarter) {
                return Err(invalid());
            }
            return Ok(GroupKey::Quarter { year, quarter });
        }

        match tail.len() {
            2 => parse_period(s).map(GroupKey::Month).ok_or_else(invalid),
            4 => {
                let next: i32 = tail.parse().map_err(|_| invalid())?;
                if next != year + 1 {
                    return Err(invalid());
                }
                Ok(GroupKey::FiscalYear { start_year: year })
            }
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(year: i32, month: u32) -> ElementaryPeriod {
        ElementaryPeriod { year, month }
    }

    #[test]
    fn test_range_invariants() {
        let range = PeriodRange::new(p(2023, 10), p(2024, 3)).unwrap();
        assert_eq!(range.len(), 6);
        assert_eq!(range.months().first(), Some(&range.start()));
        assert_eq!(range.months().last(), Some(&range.end()));
        assert!(range.months().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_range_rejects_inverted() {
        assert!(PeriodRange::new(p(2024, 2), p(2023, 2)).is_err());
    }

    #[test]
    fn test_range_rejects_out_of_bounds_month() {
        let thirteen = PeriodRange::new(p(2024, 13), p(2025, 1)).unwrap_err();
        assert!(thirteen.is_invalid_input());

        let zero = PeriodRange::new(p(2024, 0), p(2024, 2)).unwrap_err();
        assert!(zero.is_invalid_input());

        assert!(PeriodRange::new(p(2024, 1), p(2024, 12)).is_ok());
    }

    #[test]
    fn test_deserialize_validates_month() {
        let ok: ElementaryPeriod = serde_json::from_str(r#"{"year": 2024, "month": 12}"#).unwrap();
        assert_eq!(ok, p(2024, 12));

        assert!(serde_json::from_str::<ElementaryPeriod>(r#"{"year": 2024, "month": 13}"#).is_err());
        assert!(serde_json::from_str::<ElementaryPeriod>(r#"{"year": 2024, "month": 0}"#).is_err());
        assert_eq!(ElementaryPeriod::new(2024, 0), None);
    }

    #[test]
    fn test_group_key_labels() {
        assert_eq!(
            GroupKey::for_period(Granularity::Monthly, p(2024, 2)).to_string(),
            "2024-02"
        );
        assert_eq!(
            GroupKey::for_period(Granularity::Quarterly, p(2024, 5)).to_string(),
            "2024-Q2"
        );
        assert_eq!(
            GroupKey::for_period(Granularity::FiscalYear, p(2024, 3)).to_string(),
            "2023-2024"
        );
        assert_eq!(
            GroupKey::for_period(Granularity::FiscalYear, p(2024, 4)).to_string(),
            "2024-2025"
        );
    }

    #[test]
    fn test_group_key_bounds() {
        let q2: GroupKey = "2024-Q2".parse().unwrap();
        assert_eq!(q2.first_month(), p(2024, 4));
        assert_eq!(q2.last_month(), p(2024, 6));

        let fy: GroupKey = "2023-2024".parse().unwrap();
        assert_eq!(fy.first_month(), p(2023, 4));
        assert_eq!(fy.last_month(), p(2024, 3));

        let month: GroupKey = "2024-07".parse().unwrap();
        assert_eq!(month, GroupKey::Month(p(2024, 7)));
    }

    #[test]
    fn test_group_key_parse_rejects_garbage() {
        assert!("2024-Q5".parse::<GroupKey>().is_err());
        assert!("2024-Q12".parse::<GroupKey>().is_err());
        assert!("2023-2025".parse::<GroupKey>().is_err());
        assert!("2024-13".parse::<GroupKey>().is_err());
        assert!("Q1-2024".parse::<GroupKey>().is_err());
    }

    #[test]
    fn test_month_end() {
        assert_eq!(
            p(2024, 2).month_end(),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
        assert_eq!(
            ElementaryPeriod::from_date(NaiveDate::from_ymd_opt(2023, 6, 15).unwrap()),
            p(2023, 6)
        );
    }
}
