//! Calendar period indices (year-week, year-month, year-quarter).
//!
//! Periods are numbered from the period containing 1970-01-01, so that an
//! integer ordinal and a `Date32` column agree on the same axis. ISO weeks are
//! numbered from Monday 1969-12-29, the first day of ISO week 1970-W01.

use std::{fmt, str::FromStr};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::IndexValue;

/// Days between 0001-01-01 (CE day 1) and 1970-01-01.
const UNIX_EPOCH_FROM_CE: i64 = 719_163;

/// Day offset of Monday 1969-12-29 from 1970-01-01.
const ISO_WEEK_ZERO_MONDAY: i64 = -3;

const MEAN_MONTH_DAYS: f64 = 30.436_875;

const MONTH_ABBREV: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// A declared calendar-period index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Calendar {
    /// ISO weeks.
    YearWeek,
    /// Calendar months.
    YearMonth,
    /// Calendar quarters.
    YearQuarter,
}

impl Calendar {
    /// Period ordinal containing the given day (days since 1970-01-01).
    pub fn ordinal_of_day(self, days: i64) -> i64 {
        match self {
            Calendar::YearWeek => (days - ISO_WEEK_ZERO_MONDAY).div_euclid(7),
            Calendar::YearMonth | Calendar::YearQuarter => {
                let months = date_from_epoch_days(days)
                    .map(|date| (date.year() as i64 - 1970) * 12 + date.month0() as i64)
                    // Outside chrono's range: mean-length months.
                    .unwrap_or_else(|| (days as f64 / MEAN_MONTH_DAYS).floor() as i64);
                if self == Calendar::YearMonth {
                    months
                } else {
                    months.div_euclid(3)
                }
            }
        }
    }

    /// First day (days since 1970-01-01) of the period with the given ordinal.
    pub fn first_day_of(self, ordinal: i64) -> i64 {
        match self {
            Calendar::YearWeek => ordinal.saturating_mul(7).saturating_add(ISO_WEEK_ZERO_MONDAY),
            Calendar::YearMonth => month_start(ordinal),
            Calendar::YearQuarter => month_start(ordinal.saturating_mul(3)),
        }
    }

    /// Human-facing decoding of a period ordinal.
    pub fn decode(self, ordinal: i64) -> IndexValue {
        match self {
            Calendar::YearWeek => {
                // The Thursday of an ISO week always lies in that week's ISO year.
                let thursday = self.first_day_of(ordinal).saturating_add(3);
                match date_from_epoch_days(thursday) {
                    Some(date) => {
                        let iso = date.iso_week();
                        IndexValue::YearWeek {
                            year: iso.year(),
                            week: iso.week(),
                        }
                    }
                    None => IndexValue::Ordinal(ordinal),
                }
            }
            Calendar::YearMonth => match calendar_year(ordinal.div_euclid(12)) {
                Some(year) => IndexValue::YearMonth {
                    year,
                    month: ordinal.rem_euclid(12) as u32 + 1,
                },
                None => IndexValue::Ordinal(ordinal),
            },
            Calendar::YearQuarter => match calendar_year(ordinal.div_euclid(4)) {
                Some(year) => IndexValue::YearQuarter {
                    year,
                    quarter: ordinal.rem_euclid(4) as u32 + 1,
                },
                None => IndexValue::Ordinal(ordinal),
            },
        }
    }
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Calendar::YearWeek => "yearweek",
            Calendar::YearMonth => "yearmonth",
            Calendar::YearQuarter => "yearquarter",
        })
    }
}

impl FromStr for Calendar {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
            "yearweek" | "week" | "weekly" => Ok(Calendar::YearWeek),
            "yearmonth" | "month" | "monthly" => Ok(Calendar::YearMonth),
            "yearquarter" | "quarter" | "quarterly" => Ok(Calendar::YearQuarter),
            other => Err(format!("unknown calendar index '{other}'")),
        }
    }
}

/// Convert days since 1970-01-01 to a date, if chrono can represent it.
pub fn date_from_epoch_days(days: i64) -> Option<NaiveDate> {
    let ce = i32::try_from(days.checked_add(UNIX_EPOCH_FROM_CE)?).ok()?;
    NaiveDate::from_num_days_from_ce_opt(ce)
}

/// Convert a date to days since 1970-01-01.
pub fn epoch_days(date: NaiveDate) -> i64 {
    date.num_days_from_ce() as i64 - UNIX_EPOCH_FROM_CE
}

/// Calendar year `years_since_epoch` after 1970, if it fits an `i32`.
fn calendar_year(years_since_epoch: i64) -> Option<i32> {
    years_since_epoch
        .checked_add(1970)
        .and_then(|year| i32::try_from(year).ok())
}

pub(crate) fn month_abbrev(month: u32) -> &'static str {
    MONTH_ABBREV
        .get(month.wrapping_sub(1) as usize)
        .copied()
        .unwrap_or("???")
}

fn month_start(months_since_epoch: i64) -> i64 {
    let month = months_since_epoch.rem_euclid(12) as u32 + 1;
    calendar_year(months_since_epoch.div_euclid(12))
        .and_then(|y| NaiveDate::from_ymd_opt(y, month, 1))
        .map(epoch_days)
        .unwrap_or_else(|| (months_since_epoch as f64 * MEAN_MONTH_DAYS).round() as i64)
}
