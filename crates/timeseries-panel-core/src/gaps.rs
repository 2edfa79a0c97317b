//! Implicit missing observations.
//!
//! Given a regular step, every key group spans a grid `anchor + k·step`
//! whose bounds depend on the [`FillScope`]. Grid points the group does not
//! observe are its *gaps*. This module:
//!
//! - fills them in ([`fill_gaps`], in [`fill`]), synthesizing rows whose
//!   measured columns follow a [`FillPolicy`];
//! - reports them without materializing rows ([`count_gaps`],
//!   [`scan_gaps`], [`has_gaps`], [`summarize_gaps`], in [`scan`]);
//! - extends each group past its last observation ([`new_data`]).
//!
//! The step is the override in [`FillOptions::interval`] when given,
//! otherwise the table interval. Either way it must be regular and
//! expressible as a whole number of canonical units on the index axis.
//!
//! Operations that produce one value or row per missing point refuse to
//! produce more than [`MAX_MATERIALIZED_GAPS`] of them.

pub mod fill;
pub mod scan;

use std::{collections::BTreeMap, fmt, str::FromStr, sync::Arc};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    coverage::{Coverage, GridSpan},
    error::{
        CannotInferIntervalSnafu, EmptyTableSnafu, IncompatibleIntervalSnafu, Result,
        TooManyGapsSnafu,
    },
    index::{IndexValue, axis::AxisPoint},
    interval::Interval,
    key::KeyTuple,
    table::PanelTable,
};

pub use fill::fill_gaps;
pub use scan::{GapRun, GapSummary, count_gaps, has_gaps, new_data, scan_gaps, summarize_gaps};

/// Most missing points [`fill_gaps`], [`scan_gaps`] and [`new_data`] produce in one call.
pub const MAX_MATERIALIZED_GAPS: u64 = 1 << 26;

/// Which span of the time axis each group's grid covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FillScope {
    /// From the group's own first to its own last observation.
    #[default]
    PerGroup,
    /// From the table's first to the table's last observation.
    Global,
    /// From the table's first observation to the group's last.
    ExtendStart,
    /// From the group's first observation to the table's last.
    ExtendEnd,
}

impl fmt::Display for FillScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FillScope::PerGroup => "per-group",
            FillScope::Global => "global",
            FillScope::ExtendStart => "extend-start",
            FillScope::ExtendEnd => "extend-end",
        })
    }
}

impl FromStr for FillScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "per-group" | "group" => Ok(FillScope::PerGroup),
            "global" | "full" => Ok(FillScope::Global),
            "extend-start" | "start" => Ok(FillScope::ExtendStart),
            "extend-end" | "end" => Ok(FillScope::ExtendEnd),
            other => Err(format!("unknown fill scope '{other}'")),
        }
    }
}

/// A constant written into a measured column of a synthesized row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FillValue {
    /// Null.
    Missing,
    /// A boolean.
    Boolean(bool),
    /// A signed integer; fits integer and float columns.
    Int(i64),
    /// An unsigned integer; fits integer and float columns.
    UInt(u64),
    /// A float; fits float columns, and integer columns when it is whole.
    Float(f64),
    /// Text; fits string columns.
    Text(String),
}

impl FillValue {
    pub(crate) fn as_i64(&self) -> Option<i64> {
        match self {
            FillValue::Int(v) => Some(*v),
            FillValue::UInt(v) => i64::try_from(*v).ok(),
            FillValue::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }

    pub(crate) fn as_u64(&self) -> Option<u64> {
        match self {
            FillValue::Int(v) => u64::try_from(*v).ok(),
            FillValue::UInt(v) => Some(*v),
            FillValue::Float(v) if v.fract() == 0.0 && *v >= 0.0 && v.is_finite() => {
                Some(*v as u64)
            }
            _ => None,
        }
    }

    pub(crate) fn as_f64(&self) -> Option<f64> {
        match self {
            FillValue::Int(v) => Some(*v as f64),
            FillValue::UInt(v) => Some(*v as f64),
            FillValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromStr for FillValue {
    type Err = std::convert::Infallible;

    /// Integers, then floats, then `true`/`false`, then `NA`/`null`; anything else is text.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(v) = s.parse::<i64>() {
            return Ok(FillValue::Int(v));
        }
        if let Ok(v) = s.parse::<f64>() {
            return Ok(FillValue::Float(v));
        }
        Ok(match s {
            "true" => FillValue::Boolean(true),
            "false" => FillValue::Boolean(false),
            "NA" | "null" => FillValue::Missing,
            other => FillValue::Text(other.to_string()),
        })
    }
}

/// What a fill function is asked to produce a value for.
#[derive(Debug, Clone, Copy)]
pub struct FillContext<'a> {
    /// Key of the group receiving the row.
    pub key: &'a KeyTuple,
    /// Index point of the synthesized row.
    pub index: &'a IndexValue,
    /// Measured column being filled.
    pub column: &'a str,
}

/// Signature of a computed fill.
pub type FillFn = dyn Fn(&FillContext<'_>) -> FillValue + Send + Sync;

/// How measured columns of synthesized rows are populated.
#[derive(Clone, Default)]
pub enum FillPolicy {
    /// Every measured value is null.
    #[default]
    NoFill,
    /// The same constant in every measured column.
    Value(FillValue),
    /// Named constants; measured columns not named are null.
    PerColumn(BTreeMap<String, FillValue>),
    /// A value computed per synthesized row and column.
    Function(Arc<FillFn>),
}

impl fmt::Debug for FillPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FillPolicy::NoFill => f.write_str("NoFill"),
            FillPolicy::Value(v) => f.debug_tuple("Value").field(v).finish(),
            FillPolicy::PerColumn(m) => f.debug_tuple("PerColumn").field(m).finish(),
            FillPolicy::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// Options for [`fill_gaps`].
#[derive(Debug, Clone, Default)]
pub struct FillOptions {
    /// Step override; `None` uses the table interval.
    pub interval: Option<Interval>,
    /// How to populate measured columns.
    pub policy: FillPolicy,
    /// Grid bounds per group.
    pub scope: FillScope,
}

impl FillOptions {
    /// Use `interval` instead of the table interval.
    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Populate measured columns with `policy`.
    pub fn with_policy(mut self, policy: FillPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Bound each group's grid by `scope`.
    pub fn with_scope(mut self, scope: FillScope) -> Self {
        self.scope = scope;
        self
    }
}

/// One group's grid and what it observes on it.
#[derive(Debug)]
pub(crate) struct GroupGrid<'a, P> {
    pub key: &'a KeyTuple,
    pub rows: &'a [usize],
    pub anchor: P,
    pub step: P,
    pub span: GridSpan,
    pub coverage: Coverage,
}

impl<P: AxisPoint> GroupGrid<'_, P> {
    /// Grid points the group does not observe, ascending.
    pub fn missing_points(&self) -> Vec<P> {
        self.coverage
            .missing_slots(&self.span)
            .iter()
            .map(|slot| P::grid_point(self.anchor, self.step, slot as u64))
            .collect()
    }
}

/// Fail with [`PanelError::TooManyGaps`](crate::PanelError::TooManyGaps) when
/// `missing` exceeds [`MAX_MATERIALIZED_GAPS`].
pub(crate) fn ensure_materializable(missing: u64) -> Result<()> {
    ensure!(
        missing <= MAX_MATERIALIZED_GAPS,
        TooManyGapsSnafu {
            missing,
            max: MAX_MATERIALIZED_GAPS,
        }
    );
    Ok(())
}

/// Missing points across `grids`.
pub(crate) fn total_missing<P>(grids: &[GroupGrid<'_, P>]) -> u64 {
    grids.iter().fold(0u64, |acc, grid| {
        acc.saturating_add(grid.coverage.missing_count(&grid.span))
    })
}

/// The regular step to use, as a canonical length on the index axis.
pub(crate) fn effective_step<P: AxisPoint>(
    table: &PanelTable,
    interval: Option<Interval>,
) -> Result<P> {
    let interval = interval.unwrap_or(table.interval());
    ensure!(interval.is_regular(), CannotInferIntervalSnafu { interval });
    P::from_interval(interval, table.projection().scale()).context(IncompatibleIntervalSnafu {
        interval,
        kind: table.index_kind(),
    })
}

/// Build every group's grid under `scope` at `step`.
pub(crate) fn group_grids<'a, P: AxisPoint>(
    table: &'a PanelTable,
    values: &[P],
    step: P,
    scope: FillScope,
) -> Result<Vec<GroupGrid<'a, P>>> {
    ensure!(table.num_rows() > 0, EmptyTableSnafu);

    // (key, rows, first, last) for every non-empty group.
    let bounds: Vec<(&KeyTuple, &[usize], P, P)> = table
        .partition()
        .groups()
        .iter()
        .filter_map(|(key, rows)| {
            let (first, last) = extent(values, rows)?;
            Some((key, rows.as_slice(), first, last))
        })
        .collect();

    let global_first = bounds.iter().map(|b| b.2).min_by(P::axis_cmp);
    let global_last = bounds.iter().map(|b| b.3).max_by(P::axis_cmp);
    let (Some(global_first), Some(global_last)) = (global_first, global_last) else {
        return EmptyTableSnafu.fail();
    };

    bounds
        .par_iter()
        .map(|&(key, rows, first, last)| {
            let (lo, hi) = match scope {
                FillScope::PerGroup => (first, last),
                FillScope::Global => (global_first, global_last),
                FillScope::ExtendStart => (global_first, last),
                FillScope::ExtendEnd => (first, global_last),
            };
            let span = GridSpan::new(P::steps_between(lo, hi, step).saturating_add(1))?;
            let coverage = rows
                .iter()
                .filter_map(|r| values[*r].grid_offset(lo, step))
                .filter_map(|k| span.slot(k))
                .collect();
            Ok(GroupGrid {
                key,
                rows,
                anchor: lo,
                step,
                span,
                coverage,
            })
        })
        .collect()
}

/// First and last value of `values[rows]` along the axis.
pub(crate) fn extent<P: AxisPoint>(values: &[P], rows: &[usize]) -> Option<(P, P)> {
    let first = rows.iter().map(|r| values[*r]).min_by(P::axis_cmp)?;
    let last = rows.iter().map(|r| values[*r]).max_by(P::axis_cmp)?;
    Some((first, last))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_parses_and_displays() {
        for scope in [
            FillScope::PerGroup,
            FillScope::Global,
            FillScope::ExtendStart,
            FillScope::ExtendEnd,
        ] {
            assert_eq!(scope.to_string().parse::<FillScope>().unwrap(), scope);
        }
        assert_eq!("FULL".parse::<FillScope>().unwrap(), FillScope::Global);
        assert!("sideways".parse::<FillScope>().is_err());
    }

    #[test]
    fn fill_value_parses_most_specific_type() {
        assert_eq!("3".parse::<FillValue>().unwrap(), FillValue::Int(3));
        assert_eq!("2.5".parse::<FillValue>().unwrap(), FillValue::Float(2.5));
        assert_eq!("true".parse::<FillValue>().unwrap(), FillValue::Boolean(true));
        assert_eq!("NA".parse::<FillValue>().unwrap(), FillValue::Missing);
        assert_eq!(
            "n/a".parse::<FillValue>().unwrap(),
            FillValue::Text("n/a".to_string())
        );
    }

    #[test]
    fn fill_value_numeric_conversions() {
        assert_eq!(FillValue::Float(4.0).as_i64(), Some(4));
        assert_eq!(FillValue::Float(4.5).as_i64(), None);
        assert_eq!(FillValue::Int(-1).as_u64(), None);
        assert_eq!(FillValue::UInt(7).as_f64(), Some(7.0));
        assert_eq!(FillValue::Text("x".into()).as_f64(), None);
    }

    #[test]
    fn options_builder() {
        let opts = FillOptions::default()
            .with_scope(FillScope::Global)
            .with_policy(FillPolicy::Value(FillValue::Int(0)));
        assert_eq!(opts.scope, FillScope::Global);
        assert!(opts.interval.is_none());
        assert_eq!(format!("{:?}", opts.policy), "Value(Int(0))");
    }
}
