//! Interval units, rational magnitudes and the human-friendly interval syntax.
//!
//! An interval is written as a magnitude followed by a unit symbol, for
//! example `1M` (one month), `15m` (fifteen minutes), `2W`, `1/4` (a
//! unitless quarter step) or `3 hours`. Irregular and unknown intervals are
//! written `!` and `?`.
//!
//! Single-letter symbols are case-sensitive (`m` is a minute, `M` a month);
//! spelled-out aliases (`min`, `month`, `quarters`, ...) are not.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use super::Interval;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Upper bound on the denominator when approximating a float step by a fraction.
pub const MAX_DENOMINATOR: u64 = 1_000_000;

/// Calendar or clock unit a regular interval is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    /// Nanoseconds.
    Nanosecond,
    /// Microseconds.
    Microsecond,
    /// Milliseconds.
    Millisecond,
    /// Seconds.
    Second,
    /// Minutes.
    Minute,
    /// Hours.
    Hour,
    /// Days.
    Day,
    /// Weeks.
    Week,
    /// Months.
    Month,
    /// Quarters.
    Quarter,
    /// Years.
    Year,
    /// A step on an axis without calendar meaning.
    Unit,
}

impl IntervalUnit {
    /// Fixed-length units, finest first.
    pub const FIXED: [IntervalUnit; 8] = [
        IntervalUnit::Nanosecond,
        IntervalUnit::Microsecond,
        IntervalUnit::Millisecond,
        IntervalUnit::Second,
        IntervalUnit::Minute,
        IntervalUnit::Hour,
        IntervalUnit::Day,
        IntervalUnit::Week,
    ];

    /// Month-based units, finest first.
    pub const MONTHLY: [IntervalUnit; 3] =
        [IntervalUnit::Month, IntervalUnit::Quarter, IntervalUnit::Year];

    /// Length in nanoseconds for fixed-length units.
    pub fn fixed_nanos(self) -> Option<i64> {
        Some(match self {
            IntervalUnit::Nanosecond => 1,
            IntervalUnit::Microsecond => 1_000,
            IntervalUnit::Millisecond => 1_000_000,
            IntervalUnit::Second => NANOS_PER_SECOND,
            IntervalUnit::Minute => 60 * NANOS_PER_SECOND,
            IntervalUnit::Hour => 3_600 * NANOS_PER_SECOND,
            IntervalUnit::Day => 86_400 * NANOS_PER_SECOND,
            IntervalUnit::Week => 7 * 86_400 * NANOS_PER_SECOND,
            _ => return None,
        })
    }

    /// Length in months for month-based units.
    pub fn months(self) -> Option<i64> {
        match self {
            IntervalUnit::Month => Some(1),
            IntervalUnit::Quarter => Some(3),
            IntervalUnit::Year => Some(12),
            _ => None,
        }
    }

    /// Short symbol used by [`Interval`]'s `Display`.
    pub fn symbol(self) -> &'static str {
        match self {
            IntervalUnit::Nanosecond => "ns",
            IntervalUnit::Microsecond => "us",
            IntervalUnit::Millisecond => "ms",
            IntervalUnit::Second => "s",
            IntervalUnit::Minute => "m",
            IntervalUnit::Hour => "h",
            IntervalUnit::Day => "D",
            IntervalUnit::Week => "W",
            IntervalUnit::Month => "M",
            IntervalUnit::Quarter => "Q",
            IntervalUnit::Year => "Y",
            IntervalUnit::Unit => "",
        }
    }

    fn from_symbol(symbol: &str) -> Option<Self> {
        let exact = match symbol {
            "ns" => Some(IntervalUnit::Nanosecond),
            "us" | "µs" => Some(IntervalUnit::Microsecond),
            "ms" => Some(IntervalUnit::Millisecond),
            "s" => Some(IntervalUnit::Second),
            "m" => Some(IntervalUnit::Minute),
            "h" => Some(IntervalUnit::Hour),
            "D" => Some(IntervalUnit::Day),
            "W" => Some(IntervalUnit::Week),
            "M" => Some(IntervalUnit::Month),
            "Q" => Some(IntervalUnit::Quarter),
            "Y" => Some(IntervalUnit::Year),
            "" => Some(IntervalUnit::Unit),
            _ => None,
        };
        if exact.is_some() {
            return exact;
        }

        match symbol.to_ascii_lowercase().as_str() {
            "nanosecond" | "nanoseconds" | "nanos" => Some(IntervalUnit::Nanosecond),
            "microsecond" | "microseconds" | "micros" => Some(IntervalUnit::Microsecond),
            "millisecond" | "milliseconds" | "millis" => Some(IntervalUnit::Millisecond),
            "sec" | "secs" | "second" | "seconds" => Some(IntervalUnit::Second),
            "min" | "mins" | "minute" | "minutes" => Some(IntervalUnit::Minute),
            "hr" | "hrs" | "hour" | "hours" => Some(IntervalUnit::Hour),
            "d" | "day" | "days" => Some(IntervalUnit::Day),
            "w" | "wk" | "wks" | "week" | "weeks" => Some(IntervalUnit::Week),
            "mon" | "mons" | "month" | "months" => Some(IntervalUnit::Month),
            "q" | "qtr" | "quarter" | "quarters" => Some(IntervalUnit::Quarter),
            "y" | "yr" | "yrs" | "year" | "years" => Some(IntervalUnit::Year),
            "unit" | "units" => Some(IntervalUnit::Unit),
            _ => None,
        }
    }
}

impl fmt::Display for IntervalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IntervalUnit::Nanosecond => "nanosecond",
            IntervalUnit::Microsecond => "microsecond",
            IntervalUnit::Millisecond => "millisecond",
            IntervalUnit::Second => "second",
            IntervalUnit::Minute => "minute",
            IntervalUnit::Hour => "hour",
            IntervalUnit::Day => "day",
            IntervalUnit::Week => "week",
            IntervalUnit::Month => "month",
            IntervalUnit::Quarter => "quarter",
            IntervalUnit::Year => "year",
            IntervalUnit::Unit => "unit",
        })
    }
}

/// A positive rational step count, `numer / denom` in lowest terms.
///
/// Whole multiples have `denom == 1`. Fractions only arise on approximate
/// axes, where a float divisor such as `0.0833…` is reported as `1/12`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Magnitude {
    numer: u64,
    denom: u64,
}

impl Magnitude {
    /// One whole unit.
    pub const ONE: Magnitude = Magnitude { numer: 1, denom: 1 };

    /// A whole number of units. Returns `None` for zero.
    pub fn whole(n: u64) -> Option<Self> {
        (n > 0).then_some(Magnitude { numer: n, denom: 1 })
    }

    /// `numer / denom` reduced to lowest terms. Returns `None` if either is zero.
    pub fn new(numer: u64, denom: u64) -> Option<Self> {
        if numer == 0 || denom == 0 {
            return None;
        }
        let g = gcd_u64(numer, denom);
        Some(Magnitude {
            numer: numer / g,
            denom: denom / g,
        })
    }

    /// Best rational approximation of a positive float with a denominator of
    /// at most [`MAX_DENOMINATOR`], via continued fractions.
    pub fn approximate(value: f64) -> Option<Self> {
        if !value.is_finite() || value <= 0.0 || value > u64::MAX as f64 / 2.0 {
            return None;
        }

        // Convergents h/k of the continued fraction of `value`.
        let (mut h_prev, mut h) = (1u64, value.floor() as u64);
        let (mut k_prev, mut k) = (0u64, 1u64);
        let mut rest = value - value.floor();

        for _ in 0..64 {
            if (h as f64 / k as f64 - value).abs() <= f64::EPSILON * value.max(1.0) {
                break;
            }
            if rest.abs() < 1e-15 {
                break;
            }
            let inv = 1.0 / rest;
            let a = inv.floor();
            rest = inv - a;
            let a = a as u64;

            let Some(k_next) = a.checked_mul(k).and_then(|v| v.checked_add(k_prev)) else {
                break;
            };
            if k_next > MAX_DENOMINATOR {
                break;
            }
            let Some(h_next) = a.checked_mul(h).and_then(|v| v.checked_add(h_prev)) else {
                break;
            };
            (h_prev, h) = (h, h_next);
            (k_prev, k) = (k, k_next);
        }

        Magnitude::new(h, k)
    }

    /// Numerator.
    pub fn numer(self) -> u64 {
        self.numer
    }

    /// Denominator.
    pub fn denom(self) -> u64 {
        self.denom
    }

    /// Whether the magnitude is a whole number.
    pub fn is_whole(self) -> bool {
        self.denom == 1
    }

    /// Floating-point value.
    pub fn as_f64(self) -> f64 {
        self.numer as f64 / self.denom as f64
    }
}

impl fmt::Display for Magnitude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denom == 1 {
            write!(f, "{}", self.numer)
        } else {
            write!(f, "{}/{}", self.numer, self.denom)
        }
    }
}

fn gcd_u64(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Errors produced when parsing an interval spec (e.g. `1M`, `15 min`, `1/4`).
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum ParseIntervalError {
    /// The spec string was empty or only whitespace.
    #[snafu(display("interval spec is empty"))]
    Empty,

    /// The spec did not include a numeric value.
    #[snafu(display("interval spec '{spec}' is missing a numeric value"))]
    MissingNumber {
        /// The original spec string.
        spec: String,
    },

    /// The numeric portion of the spec failed to parse.
    #[snafu(display("invalid interval magnitude '{number}' in '{spec}'"))]
    InvalidNumber {
        /// The original spec string.
        spec: String,
        /// The unparsable numeric portion.
        number: String,
    },

    /// The parsed magnitude was zero or negative.
    #[snafu(display("interval magnitude must be > 0 in '{spec}'"))]
    NonPositive {
        /// The original spec string.
        spec: String,
    },

    /// The spec used an unsupported unit suffix.
    #[snafu(display(
        "unknown interval unit '{unit}' in '{spec}' (expected ns|us|ms|s|m|h|D|W|M|Q|Y)"
    ))]
    UnknownUnit {
        /// The original spec string.
        spec: String,
        /// The unrecognized unit suffix.
        unit: String,
    },
}

impl FromStr for Interval {
    type Err = ParseIntervalError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let spec = input.trim();
        ensure!(!spec.is_empty(), EmptySnafu);

        match spec {
            "!" => return Ok(Interval::Irregular),
            "?" => return Ok(Interval::Unknown),
            _ => {}
        }

        // Split into numeric prefix + unit suffix.
        let unit_start = spec
            .char_indices()
            .find(|(_, c)| !(c.is_ascii_digit() || matches!(c, '.' | '/' | ' ' | '-' | '+')))
            .map(|(i, _)| i)
            .unwrap_or(spec.len());

        let (num_str, unit_str) = spec.split_at(unit_start);
        let num_str = num_str.trim();
        let unit_str = unit_str.trim();

        ensure!(
            !num_str.is_empty(),
            MissingNumberSnafu {
                spec: spec.to_string()
            }
        );

        let unit = IntervalUnit::from_symbol(unit_str).context(UnknownUnitSnafu {
            spec: spec.to_string(),
            unit: unit_str.to_string(),
        })?;

        let magnitude = parse_magnitude(spec, num_str)?;
        Ok(Interval::Regular { unit, magnitude })
    }
}

fn parse_magnitude(spec: &str, number: &str) -> Result<Magnitude, ParseIntervalError> {
    let invalid = || ParseIntervalError::InvalidNumber {
        spec: spec.to_string(),
        number: number.to_string(),
    };
    let non_positive = || ParseIntervalError::NonPositive {
        spec: spec.to_string(),
    };

    if number.starts_with('-') {
        return Err(non_positive());
    }

    if let Some((n, d)) = number.split_once('/') {
        let n: u64 = n.trim().parse().map_err(|_| invalid())?;
        let d: u64 = d.trim().parse().map_err(|_| invalid())?;
        ensure!(d > 0, InvalidNumberSnafu { spec, number });
        return Magnitude::new(n, d).ok_or_else(non_positive);
    }

    if let Ok(n) = number.trim_start_matches('+').parse::<u64>() {
        return Magnitude::whole(n).ok_or_else(non_positive);
    }

    let value: f64 = number.parse().map_err(|_| invalid())?;
    ensure!(value > 0.0, NonPositiveSnafu { spec });
    Magnitude::approximate(value).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regular(unit: IntervalUnit, n: u64) -> Interval {
        Interval::regular(unit, n)
    }

    #[test]
    fn parse_symbols_are_case_sensitive() {
        assert_eq!("1M".parse::<Interval>().unwrap(), regular(IntervalUnit::Month, 1));
        assert_eq!("15m".parse::<Interval>().unwrap(), regular(IntervalUnit::Minute, 15));
        assert_eq!("2D".parse::<Interval>().unwrap(), regular(IntervalUnit::Day, 2));
        assert_eq!("1Q".parse::<Interval>().unwrap(), regular(IntervalUnit::Quarter, 1));
    }

    #[test]
    fn parse_aliases_ignore_case() {
        assert_eq!("3 Hours".parse::<Interval>().unwrap(), regular(IntervalUnit::Hour, 3));
        assert_eq!("1 month".parse::<Interval>().unwrap(), regular(IntervalUnit::Month, 1));
        assert_eq!("2 WEEKS".parse::<Interval>().unwrap(), regular(IntervalUnit::Week, 2));
    }

    #[test]
    fn parse_unitless_and_fractions() {
        assert_eq!("5".parse::<Interval>().unwrap(), regular(IntervalUnit::Unit, 5));
        let quarter = "1/4".parse::<Interval>().unwrap();
        assert_eq!(
            quarter,
            Interval::Regular {
                unit: IntervalUnit::Unit,
                magnitude: Magnitude::new(1, 4).unwrap(),
            }
        );
        assert_eq!("0.25".parse::<Interval>().unwrap(), quarter);
    }

    #[test]
    fn parse_special_markers() {
        assert_eq!("!".parse::<Interval>().unwrap(), Interval::Irregular);
        assert_eq!(" ? ".parse::<Interval>().unwrap(), Interval::Unknown);
    }

    #[test]
    fn parse_errors() {
        assert_eq!("".parse::<Interval>(), Err(ParseIntervalError::Empty));
        assert!(matches!(
            "h".parse::<Interval>(),
            Err(ParseIntervalError::MissingNumber { .. })
        ));
        assert!(matches!(
            "0D".parse::<Interval>(),
            Err(ParseIntervalError::NonPositive { .. })
        ));
        assert!(matches!(
            "-1D".parse::<Interval>(),
            Err(ParseIntervalError::NonPositive { .. })
        ));
        assert!(matches!(
            "2 fortnights".parse::<Interval>(),
            Err(ParseIntervalError::UnknownUnit { .. })
        ));
        assert!(matches!(
            "1/0".parse::<Interval>(),
            Err(ParseIntervalError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn display_round_trips_through_parse() {
        for text in ["1M", "15m", "2h", "1Q", "3Y", "7", "1/12", "500ms", "!", "?"] {
            let parsed: Interval = text.parse().unwrap();
            assert_eq!(parsed.to_string(), text);
        }
    }

    #[test]
    fn approximate_finds_small_fractions() {
        assert_eq!(Magnitude::approximate(1.0 / 12.0), Magnitude::new(1, 12));
        assert_eq!(Magnitude::approximate(0.1), Magnitude::new(1, 10));
        assert_eq!(Magnitude::approximate(2.5), Magnitude::new(5, 2));
        assert_eq!(Magnitude::approximate(3.0), Magnitude::whole(3));
        assert_eq!(Magnitude::approximate(0.0), None);
    }

    #[test]
    fn magnitude_reduces() {
        let m = Magnitude::new(6, 8).unwrap();
        assert_eq!((m.numer(), m.denom()), (3, 4));
        assert!(!m.is_whole());
        assert!(Magnitude::new(0, 3).is_none());
    }
}
