//! Index classification: turning an Arrow column into a canonical, totally
//! ordered time axis.
//!
//! Every supported index representation is a variant of the closed
//! [`IndexKind`] enum. A kind knows how to:
//!
//! - project raw column values onto a canonical numeric axis
//!   ([`classify_index`] → [`IndexProjection`]),
//! - describe the unit of that axis ([`AxisScale`]), which the interval
//!   engine uses to name a step ("1 month", "2 hours"),
//! - decode a canonical value for display ([`IndexValue`]),
//! - materialize canonical values back into the column's physical Arrow
//!   type (used when gap filling synthesizes rows).
//!
//! Canonical axes:
//!
//! | kind          | physical types              | canonical unit           | order       |
//! |---------------|-----------------------------|--------------------------|-------------|
//! | `Date`        | `Date32`, `Date64`          | days since 1970-01-01    | exact       |
//! | `Timestamp`   | `Timestamp(_, tz)`          | UTC nanoseconds          | exact       |
//! | `Ordinal`     | signed/unsigned integers    | the integer              | exact       |
//! | `Decimal`     | `Float32`, `Float64`        | the float                | approximate |
//! | `YearWeek`    | `Date32`/`Date64`, integers | ISO weeks since 1970-W01 | exact       |
//! | `YearMonth`   | `Date32`/`Date64`, integers | months since 1970-01     | exact       |
//! | `YearQuarter` | `Date32`/`Date64`, integers | quarters since 1970-Q1   | exact       |

pub mod axis;
pub mod calendar;

use std::{fmt, str::FromStr, sync::Arc};

use arrow::{
    array::{
        Array, ArrayRef, AsArray, Date32Array, Date64Array, Float32Array, Float64Array,
        Int8Array, Int16Array, Int32Array, Int64Array, TimestampMicrosecondArray,
        TimestampMillisecondArray, TimestampNanosecondArray, TimestampSecondArray, UInt8Array,
        UInt16Array, UInt32Array, UInt64Array,
    },
    datatypes::{
        DataType, Date32Type, Date64Type, Field, Float32Type, Float64Type, Int8Type, Int16Type,
        Int32Type, Int64Type, TimeUnit, TimestampMicrosecondType, TimestampMillisecondType,
        TimestampNanosecondType, TimestampSecondType, UInt8Type, UInt16Type, UInt32Type,
        UInt64Type,
    },
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize, Serializer};
use snafu::prelude::*;

use crate::{
    error::{InvalidParameterSnafu, MissingIndexValueSnafu, PanelError, Result},
    interval::unit::{IntervalUnit, Magnitude},
};

pub use calendar::Calendar;

/// Field metadata key used to declare a calendar index on an Arrow field.
///
/// Accepted values are `"yearweek"`, `"yearmonth"` and `"yearquarter"`.
pub const CALENDAR_METADATA_KEY: &str = "timeseries_panel.calendar";

/// Approximate index values this many units in the last place apart (at the
/// larger magnitude) or closer are the same point.
///
/// The bound absorbs decimal round-off such as `0.1 + 0.2` vs `0.3` without
/// merging distinct observations at epoch-second magnitudes.
pub const APPROX_EQ_ULPS: f64 = 4.0;

/// Absolute distance under which `a` and `b` are the same approximate point.
pub(crate) fn approx_eq_tolerance(a: f64, b: f64) -> f64 {
    APPROX_EQ_ULPS * f64::EPSILON * a.abs().max(b.abs())
}

/// Integer ordinals whose range lies within these bounds are read as calendar years.
const YEAR_ORDINAL_RANGE: std::ops::RangeInclusive<i64> = 1582..=2499;

const NANOS_PER_DAY: i64 = 86_400_000_000_000;
const MILLIS_PER_DAY: i64 = 86_400_000;

/// Closed set of supported index representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Calendar dates.
    Date,
    /// Instants, with or without a time zone.
    Timestamp,
    /// Integer periods (unitless, or years when every value looks like a year).
    Ordinal,
    /// Floating-point positions, for example decimal years.
    Decimal,
    /// ISO year-week periods.
    YearWeek,
    /// Year-month periods.
    YearMonth,
    /// Year-quarter periods.
    YearQuarter,
}

impl IndexKind {
    /// Infer the index kind of `field` from its calendar metadata or data type.
    pub fn infer(field: &Field) -> Result<Self> {
        if let Some(declared) = field.metadata().get(CALENDAR_METADATA_KEY) {
            let calendar = declared.parse::<Calendar>().map_err(|_| {
                PanelError::UnsupportedIndexType {
                    column: field.name().clone(),
                    datatype: format!("{} (calendar '{declared}')", field.data_type()),
                }
            })?;
            return Ok(calendar.into());
        }

        match field.data_type() {
            DataType::Date32 | DataType::Date64 => Ok(IndexKind::Date),
            DataType::Timestamp(_, _) => Ok(IndexKind::Timestamp),
            dt if is_integer(dt) => Ok(IndexKind::Ordinal),
            DataType::Float32 | DataType::Float64 => Ok(IndexKind::Decimal),
            other => Err(PanelError::UnsupportedIndexType {
                column: field.name().clone(),
                datatype: other.to_string(),
            }),
        }
    }

    /// Whether equality on this axis needs a tolerance.
    pub fn order_kind(self) -> OrderKind {
        match self {
            IndexKind::Decimal => OrderKind::Approximate,
            _ => OrderKind::Exact,
        }
    }

    fn accepts(self, dt: &DataType) -> bool {
        match self {
            IndexKind::Date => matches!(dt, DataType::Date32 | DataType::Date64),
            IndexKind::Timestamp => matches!(dt, DataType::Timestamp(_, _)),
            IndexKind::Ordinal => is_integer(dt),
            IndexKind::Decimal => matches!(dt, DataType::Float32 | DataType::Float64),
            IndexKind::YearWeek | IndexKind::YearMonth | IndexKind::YearQuarter => {
                matches!(dt, DataType::Date32 | DataType::Date64) || is_integer(dt)
            }
        }
    }

    fn calendar(self) -> Option<Calendar> {
        match self {
            IndexKind::YearWeek => Some(Calendar::YearWeek),
            IndexKind::YearMonth => Some(Calendar::YearMonth),
            IndexKind::YearQuarter => Some(Calendar::YearQuarter),
            _ => None,
        }
    }
}

impl From<Calendar> for IndexKind {
    fn from(value: Calendar) -> Self {
        match value {
            Calendar::YearWeek => IndexKind::YearWeek,
            Calendar::YearMonth => IndexKind::YearMonth,
            Calendar::YearQuarter => IndexKind::YearQuarter,
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndexKind::Date => "date",
            IndexKind::Timestamp => "timestamp",
            IndexKind::Ordinal => "ordinal",
            IndexKind::Decimal => "decimal",
            IndexKind::YearWeek => "yearweek",
            IndexKind::YearMonth => "yearmonth",
            IndexKind::YearQuarter => "yearquarter",
        };
        f.write_str(name)
    }
}

impl FromStr for IndexKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "date" => Ok(IndexKind::Date),
            "timestamp" => Ok(IndexKind::Timestamp),
            "ordinal" => Ok(IndexKind::Ordinal),
            "decimal" => Ok(IndexKind::Decimal),
            other => other.parse::<Calendar>().map(IndexKind::from),
        }
    }
}

/// Whether two index values can be compared for equality exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    /// Integer-representable axis.
    Exact,
    /// Floating axis; equality uses [`APPROX_EQ_ULPS`].
    Approximate,
}

/// Unit of one step on a canonical axis.
///
/// This is what lets the interval engine map a raw divisor (for example
/// `3_600_000_000_000` on a nanosecond axis) to a calendar unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisScale {
    /// Fixed-length axis; the payload is nanoseconds per canonical unit.
    Nanos(i64),
    /// Month-based axis; the payload is months per canonical unit.
    Months(i64),
    /// Integer years.
    Years,
    /// No calendar meaning.
    Unitless,
}

impl AxisScale {
    /// Units a divisor on this axis can be named in, with their length in
    /// canonical units, finest first.
    pub fn ladder(self) -> Vec<(IntervalUnit, i64)> {
        match self {
            AxisScale::Nanos(per) => IntervalUnit::FIXED
                .iter()
                .filter_map(|u| {
                    let nanos = u.fixed_nanos()?;
                    (nanos >= per && nanos % per == 0).then_some((*u, nanos / per))
                })
                .collect(),
            AxisScale::Months(per) => IntervalUnit::MONTHLY
                .iter()
                .filter_map(|u| {
                    let months = u.months()?;
                    (months >= per && months % per == 0).then_some((*u, months / per))
                })
                .collect(),
            AxisScale::Years => vec![(IntervalUnit::Year, 1)],
            AxisScale::Unitless => vec![(IntervalUnit::Unit, 1)],
        }
    }

    /// Length of `unit × magnitude` in canonical units, if it is a whole
    /// number of canonical units.
    pub fn exact_len(self, unit: IntervalUnit, magnitude: Magnitude) -> Option<i64> {
        // length = unit_len * numer / (denom * per)
        let (unit_len, per): (i128, i128) = match self {
            AxisScale::Nanos(per) => (unit.fixed_nanos()? as i128, per as i128),
            AxisScale::Months(per) => (unit.months()? as i128, per as i128),
            AxisScale::Years => match unit {
                IntervalUnit::Year | IntervalUnit::Unit => (1, 1),
                _ => return None,
            },
            AxisScale::Unitless => match unit {
                IntervalUnit::Unit => (1, 1),
                _ => return None,
            },
        };
        let numer = unit_len * magnitude.numer() as i128;
        let denom = magnitude.denom() as i128 * per;
        if numer % denom != 0 {
            return None;
        }
        i64::try_from(numer / denom).ok().filter(|len| *len > 0)
    }
}

/// Canonical projection values.
#[derive(Debug, Clone, PartialEq)]
pub enum Projected {
    /// Integer axis.
    Exact(Vec<i64>),
    /// Floating axis.
    Approximate(Vec<f64>),
}

/// A classified index column: its kind, scale and canonical projection.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexProjection {
    column: String,
    kind: IndexKind,
    data_type: DataType,
    scale: AxisScale,
    values: Projected,
}

impl IndexProjection {
    /// Name of the projected column.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// The index kind the column was classified as.
    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    /// Physical Arrow type of the column.
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// Unit of one step on the canonical axis.
    pub fn scale(&self) -> AxisScale {
        self.scale
    }

    /// Exact or approximate ordering.
    pub fn order_kind(&self) -> OrderKind {
        match self.values {
            Projected::Exact(_) => OrderKind::Exact,
            Projected::Approximate(_) => OrderKind::Approximate,
        }
    }

    /// Canonical values, one per row.
    pub fn values(&self) -> &Projected {
        &self.values
    }

    /// Number of projected rows.
    pub fn len(&self) -> usize {
        match &self.values {
            Projected::Exact(v) => v.len(),
            Projected::Approximate(v) => v.len(),
        }
    }

    /// Whether the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decoded index value at `row`.
    ///
    /// # Panics
    /// Panics if `row` is out of bounds.
    pub fn value_at(&self, row: usize) -> IndexValue {
        match &self.values {
            Projected::Exact(v) => decode_exact(self.kind, v[row]),
            Projected::Approximate(v) => IndexValue::Decimal(v[row]),
        }
    }
}

/// Dispatch a generic body over the two canonical axis representations.
///
/// `$values` is bound to `&Vec<i64>` or `&Vec<f64>`.
macro_rules! with_projected {
    ($projection:expr, $values:ident => $body:expr) => {
        match $projection.values() {
            $crate::index::Projected::Exact($values) => $body,
            $crate::index::Projected::Approximate($values) => $body,
        }
    };
}
pub(crate) use with_projected;

/// Classify `column` (named `name`) as an index of kind `kind`.
///
/// Returns the canonical projection used by every downstream component.
///
/// # Errors
/// - [`PanelError::UnsupportedIndexType`] if the physical type does not
///   carry a total order for `kind`.
/// - [`PanelError::MissingIndexValue`] on nulls (or NaN/infinite floats).
/// - [`PanelError::InvalidParameter`] if a timestamp does not fit the
///   nanosecond axis.
pub fn classify_index(name: &str, column: &dyn Array, kind: IndexKind) -> Result<IndexProjection> {
    let data_type = column.data_type().clone();
    ensure!(
        kind.accepts(&data_type),
        crate::error::UnsupportedIndexTypeSnafu {
            column: name.to_string(),
            datatype: format!("{data_type} as {kind}"),
        }
    );

    if column.null_count() > 0 {
        let row = (0..column.len()).find(|i| column.is_null(*i)).unwrap_or(0);
        return MissingIndexValueSnafu {
            column: name.to_string(),
            row,
        }
        .fail();
    }

    let values = match (kind, kind.calendar()) {
        (IndexKind::Decimal, _) => Projected::Approximate(project_decimal(name, column)?),
        (IndexKind::Timestamp, _) => Projected::Exact(project_timestamp(name, column)?),
        (_, Some(calendar)) if !is_integer(&data_type) => {
            let days = project_days(column)?;
            Projected::Exact(days.into_iter().map(|d| calendar.ordinal_of_day(d)).collect())
        }
        (IndexKind::Date, _) => Projected::Exact(project_days(column)?),
        _ => Projected::Exact(project_integers(name, column)?),
    };

    let scale = match kind {
        IndexKind::Date => AxisScale::Nanos(NANOS_PER_DAY),
        IndexKind::Timestamp => AxisScale::Nanos(1),
        IndexKind::YearWeek => AxisScale::Nanos(7 * NANOS_PER_DAY),
        IndexKind::YearMonth => AxisScale::Months(1),
        IndexKind::YearQuarter => AxisScale::Months(3),
        IndexKind::Decimal => AxisScale::Unitless,
        IndexKind::Ordinal => match &values {
            Projected::Exact(v) if !v.is_empty() && v.iter().all(|y| YEAR_ORDINAL_RANGE.contains(y)) => {
                AxisScale::Years
            }
            _ => AxisScale::Unitless,
        },
    };

    Ok(IndexProjection {
        column: name.to_string(),
        kind,
        data_type,
        scale,
        values,
    })
}

fn is_integer(dt: &DataType) -> bool {
    matches!(
        dt,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

fn project_days(column: &dyn Array) -> Result<Vec<i64>> {
    match column.data_type() {
        DataType::Date32 => Ok(column
            .as_primitive::<Date32Type>()
            .values()
            .iter()
            .map(|d| *d as i64)
            .collect()),
        DataType::Date64 => Ok(column
            .as_primitive::<Date64Type>()
            .values()
            .iter()
            .map(|ms| ms.div_euclid(MILLIS_PER_DAY))
            .collect()),
        other => InvalidParameterSnafu {
            message: format!("expected a date column, found {other}"),
        }
        .fail(),
    }
}

fn project_timestamp(name: &str, column: &dyn Array) -> Result<Vec<i64>> {
    let (raw, factor): (&[i64], i64) = match column.data_type() {
        DataType::Timestamp(TimeUnit::Second, _) => {
            (column.as_primitive::<TimestampSecondType>().values(), 1_000_000_000)
        }
        DataType::Timestamp(TimeUnit::Millisecond, _) => {
            (column.as_primitive::<TimestampMillisecondType>().values(), 1_000_000)
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            (column.as_primitive::<TimestampMicrosecondType>().values(), 1_000)
        }
        DataType::Timestamp(TimeUnit::Nanosecond, _) => {
            (column.as_primitive::<TimestampNanosecondType>().values(), 1)
        }
        other => {
            return InvalidParameterSnafu {
                message: format!("expected a timestamp column, found {other}"),
            }
            .fail();
        }
    };

    raw.iter()
        .map(|v| {
            v.checked_mul(factor).ok_or_else(|| PanelError::InvalidParameter {
                message: format!("timestamp {v} in column {name} overflows the nanosecond axis"),
            })
        })
        .collect()
}

fn project_integers(name: &str, column: &dyn Array) -> Result<Vec<i64>> {
    fn widen<T>(values: &[T]) -> Vec<i64>
    where
        T: Copy + Into<i64>,
    {
        values.iter().map(|v| (*v).into()).collect()
    }

    Ok(match column.data_type() {
        DataType::Int8 => widen(column.as_primitive::<Int8Type>().values()),
        DataType::Int16 => widen(column.as_primitive::<Int16Type>().values()),
        DataType::Int32 => widen(column.as_primitive::<Int32Type>().values()),
        DataType::Int64 => widen(column.as_primitive::<Int64Type>().values()),
        DataType::UInt8 => widen(column.as_primitive::<UInt8Type>().values()),
        DataType::UInt16 => widen(column.as_primitive::<UInt16Type>().values()),
        DataType::UInt32 => widen(column.as_primitive::<UInt32Type>().values()),
        DataType::UInt64 => column
            .as_primitive::<UInt64Type>()
            .values()
            .iter()
            .map(|v| {
                i64::try_from(*v).map_err(|_| PanelError::InvalidParameter {
                    message: format!("ordinal {v} in column {name} exceeds i64::MAX"),
                })
            })
            .collect::<Result<Vec<_>>>()?,
        other => {
            return crate::error::UnsupportedIndexTypeSnafu {
                column: name.to_string(),
                datatype: other.to_string(),
            }
            .fail();
        }
    })
}

fn project_decimal(name: &str, column: &dyn Array) -> Result<Vec<f64>> {
    let values: Vec<f64> = match column.data_type() {
        DataType::Float32 => column
            .as_primitive::<Float32Type>()
            .values()
            .iter()
            .map(|v| *v as f64)
            .collect(),
        DataType::Float64 => column.as_primitive::<Float64Type>().values().to_vec(),
        other => {
            return crate::error::UnsupportedIndexTypeSnafu {
                column: name.to_string(),
                datatype: other.to_string(),
            }
            .fail();
        }
    };

    if let Some(row) = values.iter().position(|v| !v.is_finite()) {
        return MissingIndexValueSnafu {
            column: name.to_string(),
            row,
        }
        .fail();
    }
    Ok(values)
}

/// A decoded index point, used in reports and fill callbacks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndexValue {
    /// A calendar date.
    Date(NaiveDate),
    /// A UTC instant.
    Timestamp(DateTime<Utc>),
    /// An integer period.
    Ordinal(i64),
    /// A floating position.
    Decimal(f64),
    /// An ISO year-week.
    YearWeek {
        /// ISO week-numbering year.
        year: i32,
        /// ISO week, 1..=53.
        week: u32,
    },
    /// A year-month.
    YearMonth {
        /// Calendar year.
        year: i32,
        /// Month, 1..=12.
        month: u32,
    },
    /// A year-quarter.
    YearQuarter {
        /// Calendar year.
        year: i32,
        /// Quarter, 1..=4.
        quarter: u32,
    },
}

impl fmt::Display for IndexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexValue::Date(d) => write!(f, "{d}"),
            IndexValue::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            IndexValue::Ordinal(v) => write!(f, "{v}"),
            IndexValue::Decimal(v) => write!(f, "{v}"),
            IndexValue::YearWeek { year, week } => write!(f, "{year} W{week:02}"),
            IndexValue::YearMonth { year, month } => {
                write!(f, "{year} {}", calendar::month_abbrev(*month))
            }
            IndexValue::YearQuarter { year, quarter } => write!(f, "{year} Q{quarter}"),
        }
    }
}

impl Serialize for IndexValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            IndexValue::Ordinal(v) => serializer.serialize_i64(*v),
            IndexValue::Decimal(v) => serializer.serialize_f64(*v),
            other => serializer.collect_str(other),
        }
    }
}

pub(crate) fn decode_exact(kind: IndexKind, canonical: i64) -> IndexValue {
    match kind {
        IndexKind::Date => calendar::date_from_epoch_days(canonical)
            .map(IndexValue::Date)
            .unwrap_or(IndexValue::Ordinal(canonical)),
        IndexKind::Timestamp => IndexValue::Timestamp(DateTime::from_timestamp_nanos(canonical)),
        IndexKind::YearWeek => Calendar::YearWeek.decode(canonical),
        IndexKind::YearMonth => Calendar::YearMonth.decode(canonical),
        IndexKind::YearQuarter => Calendar::YearQuarter.decode(canonical),
        IndexKind::Ordinal | IndexKind::Decimal => IndexValue::Ordinal(canonical),
    }
}

/// Rebuild an Arrow column of `data_type` from exact canonical values.
pub(crate) fn materialize_exact(
    kind: IndexKind,
    data_type: &DataType,
    canonical: &[i64],
) -> Result<ArrayRef> {
    // Calendar kinds stored as dates go through the period's first day.
    let physical: Vec<i64> = match (kind.calendar(), data_type) {
        (Some(calendar), DataType::Date32 | DataType::Date64) => canonical
            .iter()
            .map(|ord| calendar.first_day_of(*ord))
            .collect(),
        _ => canonical.to_vec(),
    };

    let narrow = |what: &str| PanelError::InvalidParameter {
        message: format!("{what} value out of range while materializing {data_type}"),
    };

    let array: ArrayRef = match data_type {
        DataType::Date32 => Arc::new(Date32Array::from(
            physical
                .iter()
                .map(|d| i32::try_from(*d).map_err(|_| narrow("date")))
                .collect::<Result<Vec<_>>>()?,
        )),
        DataType::Date64 => Arc::new(Date64Array::from(
            physical
                .iter()
                .map(|d| d.checked_mul(MILLIS_PER_DAY).ok_or_else(|| narrow("date")))
                .collect::<Result<Vec<_>>>()?,
        )),
        DataType::Timestamp(unit, tz) => {
            let divisor = match unit {
                TimeUnit::Second => 1_000_000_000,
                TimeUnit::Millisecond => 1_000_000,
                TimeUnit::Microsecond => 1_000,
                TimeUnit::Nanosecond => 1,
            };
            let raw: Vec<i64> = physical.iter().map(|ns| ns.div_euclid(divisor)).collect();
            match unit {
                TimeUnit::Second => {
                    Arc::new(TimestampSecondArray::from(raw).with_timezone_opt(tz.clone()))
                }
                TimeUnit::Millisecond => {
                    Arc::new(TimestampMillisecondArray::from(raw).with_timezone_opt(tz.clone()))
                }
                TimeUnit::Microsecond => {
                    Arc::new(TimestampMicrosecondArray::from(raw).with_timezone_opt(tz.clone()))
                }
                TimeUnit::Nanosecond => {
                    Arc::new(TimestampNanosecondArray::from(raw).with_timezone_opt(tz.clone()))
                }
            }
        }
        DataType::Int8 => Arc::new(Int8Array::from(narrow_all::<i8>(&physical, || narrow("i8"))?)),
        DataType::Int16 => Arc::new(Int16Array::from(narrow_all::<i16>(&physical, || narrow("i16"))?)),
        DataType::Int32 => Arc::new(Int32Array::from(narrow_all::<i32>(&physical, || narrow("i32"))?)),
        DataType::Int64 => Arc::new(Int64Array::from(physical)),
        DataType::UInt8 => Arc::new(UInt8Array::from(narrow_all::<u8>(&physical, || narrow("u8"))?)),
        DataType::UInt16 => Arc::new(UInt16Array::from(narrow_all::<u16>(&physical, || narrow("u16"))?)),
        DataType::UInt32 => Arc::new(UInt32Array::from(narrow_all::<u32>(&physical, || narrow("u32"))?)),
        DataType::UInt64 => Arc::new(UInt64Array::from(narrow_all::<u64>(&physical, || narrow("u64"))?)),
        other => {
            return crate::error::UnsupportedIndexTypeSnafu {
                column: String::from("<materialized>"),
                datatype: other.to_string(),
            }
            .fail();
        }
    };
    Ok(array)
}

fn narrow_all<T: TryFrom<i64>>(
    values: &[i64],
    err: impl Fn() -> PanelError,
) -> Result<Vec<T>> {
    values
        .iter()
        .map(|v| T::try_from(*v).map_err(|_| err()))
        .collect()
}

/// Rebuild an Arrow float column from approximate canonical values.
pub(crate) fn materialize_approx(data_type: &DataType, canonical: &[f64]) -> Result<ArrayRef> {
    match data_type {
        DataType::Float64 => Ok(Arc::new(Float64Array::from(canonical.to_vec()))),
        DataType::Float32 => Ok(Arc::new(Float32Array::from(
            canonical.iter().map(|v| *v as f32).collect::<Vec<_>>(),
        ))),
        other => crate::error::UnsupportedIndexTypeSnafu {
            column: String::from("<materialized>"),
            datatype: other.to_string(),
        }
        .fail(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn infer_kind_from_data_type() {
        let cases = [
            (DataType::Date32, IndexKind::Date),
            (DataType::Date64, IndexKind::Date),
            (
                DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
                IndexKind::Timestamp,
            ),
            (DataType::Int32, IndexKind::Ordinal),
            (DataType::UInt16, IndexKind::Ordinal),
            (DataType::Float64, IndexKind::Decimal),
        ];
        for (dt, expected) in cases {
            let field = Field::new("t", dt.clone(), false);
            assert_eq!(IndexKind::infer(&field).unwrap(), expected, "{dt}");
        }
    }

    #[test]
    fn infer_kind_rejects_strings() {
        let field = Field::new("t", DataType::Utf8, false);
        let err = IndexKind::infer(&field).unwrap_err();
        assert!(matches!(err, PanelError::UnsupportedIndexType { .. }));
    }

    #[test]
    fn infer_kind_reads_calendar_metadata() {
        let field = Field::new("month", DataType::Date32, false).with_metadata(HashMap::from([(
            CALENDAR_METADATA_KEY.to_string(),
            "yearmonth".to_string(),
        )]));
        assert_eq!(IndexKind::infer(&field).unwrap(), IndexKind::YearMonth);

        let bad = Field::new("month", DataType::Date32, false).with_metadata(HashMap::from([(
            CALENDAR_METADATA_KEY.to_string(),
            "fortnight".to_string(),
        )]));
        assert!(IndexKind::infer(&bad).is_err());
    }

    #[test]
    fn classify_rejects_mismatched_kind() {
        let col = Int32Array::from(vec![1, 2, 3]);
        let err = classify_index("t", &col, IndexKind::Timestamp).unwrap_err();
        assert!(matches!(err, PanelError::UnsupportedIndexType { .. }));
    }

    #[test]
    fn classify_rejects_nulls_and_nan() {
        let col = Int64Array::from(vec![Some(1), None, Some(3)]);
        let err = classify_index("t", &col, IndexKind::Ordinal).unwrap_err();
        assert!(matches!(err, PanelError::MissingIndexValue { row: 1, .. }));

        let col = Float64Array::from(vec![1.0, f64::NAN]);
        let err = classify_index("t", &col, IndexKind::Decimal).unwrap_err();
        assert!(matches!(err, PanelError::MissingIndexValue { row: 1, .. }));
    }

    #[test]
    fn timestamps_in_different_units_share_an_axis() {
        let secs = TimestampSecondArray::from(vec![1_600_000_000]);
        let millis = TimestampMillisecondArray::from(vec![1_600_000_000_000])
            .with_timezone("Asia/Tokyo");
        let a = classify_index("t", &secs, IndexKind::Timestamp).unwrap();
        let b = classify_index("t", &millis, IndexKind::Timestamp).unwrap();
        assert_eq!(a.values(), b.values());
        assert_eq!(a.order_kind(), OrderKind::Exact);
    }

    #[test]
    fn date64_projects_to_days() {
        let col = Date64Array::from(vec![0, MILLIS_PER_DAY, 3 * MILLIS_PER_DAY + 5]);
        let proj = classify_index("d", &col, IndexKind::Date).unwrap();
        assert_eq!(proj.values(), &Projected::Exact(vec![0, 1, 3]));
        assert_eq!(proj.scale(), AxisScale::Nanos(NANOS_PER_DAY));
    }

    #[test]
    fn ordinal_years_use_year_scale() {
        let years = Int32Array::from(vec![2010, 2012, 2014]);
        let proj = classify_index("year", &years, IndexKind::Ordinal).unwrap();
        assert_eq!(proj.scale(), AxisScale::Years);

        let plain = Int32Array::from(vec![1, 2, 3]);
        let proj = classify_index("t", &plain, IndexKind::Ordinal).unwrap();
        assert_eq!(proj.scale(), AxisScale::Unitless);
    }

    #[test]
    fn yearmonth_dates_project_to_month_ordinals() {
        // 1970-01-15, 1970-02-01, 1971-01-31
        let col = Date32Array::from(vec![14, 31, 395]);
        let proj = classify_index("m", &col, IndexKind::YearMonth).unwrap();
        assert_eq!(proj.values(), &Projected::Exact(vec![0, 1, 12]));
        assert_eq!(
            proj.value_at(2),
            IndexValue::YearMonth {
                year: 1971,
                month: 1
            }
        );
    }

    #[test]
    fn materialize_yearmonth_dates_uses_first_day() {
        let array = materialize_exact(IndexKind::YearMonth, &DataType::Date32, &[0, 1, 12]).unwrap();
        let dates = array.as_primitive::<Date32Type>();
        assert_eq!(dates.values().to_vec(), vec![0, 31, 365]);
    }

    #[test]
    fn materialize_narrows_to_the_column_type() {
        let array = materialize_exact(IndexKind::Ordinal, &DataType::Int8, &[1, 2]).unwrap();
        assert_eq!(array.data_type(), &DataType::Int8);
        assert_eq!(array.as_primitive::<Int8Type>().values().to_vec(), vec![1, 2]);

        let array = materialize_exact(IndexKind::Ordinal, &DataType::UInt32, &[7]).unwrap();
        assert_eq!(array.as_primitive::<UInt32Type>().value(0), 7);

        let err = materialize_exact(IndexKind::Ordinal, &DataType::Int8, &[1, 300]).unwrap_err();
        assert!(matches!(err, PanelError::InvalidParameter { .. }));
        let err = materialize_exact(IndexKind::Ordinal, &DataType::UInt64, &[-1]).unwrap_err();
        assert!(matches!(err, PanelError::InvalidParameter { .. }));
    }

    #[test]
    fn materialize_date64_rejects_overflow() {
        let array = materialize_exact(IndexKind::Date, &DataType::Date64, &[2]).unwrap();
        assert_eq!(array.as_primitive::<Date64Type>().value(0), 2 * MILLIS_PER_DAY);

        let err =
            materialize_exact(IndexKind::Date, &DataType::Date64, &[i64::MAX / 1_000]).unwrap_err();
        assert!(matches!(err, PanelError::InvalidParameter { .. }));
    }

    #[test]
    fn materialize_timestamp_keeps_unit_and_zone() {
        let dt = DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into()));
        let array = materialize_exact(IndexKind::Timestamp, &dt, &[1_000_000, 2_000_000]).unwrap();
        assert_eq!(array.data_type(), &dt);
        let ts = array.as_primitive::<TimestampMillisecondType>();
        assert_eq!(ts.values().to_vec(), vec![1, 2]);
    }

    #[test]
    fn index_value_display() {
        assert_eq!(
            IndexValue::YearMonth {
                year: 2020,
                month: 3
            }
            .to_string(),
            "2020 Mar"
        );
        assert_eq!(
            IndexValue::YearWeek {
                year: 2021,
                week: 5
            }
            .to_string(),
            "2021 W05"
        );
        assert_eq!(
            IndexValue::YearQuarter {
                year: 1999,
                quarter: 4
            }
            .to_string(),
            "1999 Q4"
        );
    }

    #[test]
    fn index_kind_parses_names() {
        assert_eq!("YearMonth".parse::<IndexKind>().unwrap(), IndexKind::YearMonth);
        assert_eq!("date".parse::<IndexKind>().unwrap(), IndexKind::Date);
        assert!("calendar".parse::<IndexKind>().is_err());
    }
}
