//! Arithmetic on canonical index axes.
//!
//! [`AxisPoint`] is implemented for `i64` (exact axes) and `f64`
//! (approximate axes). Interval inference, validity checking and gap filling
//! are written once against this trait and dispatched with
//! `with_projected!`.
//!
//! Approximate axes use two tolerances. Point equality is a few ULPs (see
//! [`APPROX_EQ_ULPS`](super::APPROX_EQ_ULPS)), so distinct observations stay
//! distinct at any magnitude. Grid membership is `GCD_TOLERANCE · step`, the
//! same residual the interval search accepts, and never less than point
//! equality: a value that equals a grid point always occupies its slot, so a
//! synthesized point can never duplicate an observation.

use std::{cmp::Ordering, fmt::Debug};

use arrow::{array::ArrayRef, datatypes::DataType};

use super::{AxisScale, IndexKind, IndexValue, approx_eq_tolerance, decode_exact};
use crate::{
    error::Result,
    interval::{
        Interval,
        gcd::{self, GCD_TOLERANCE},
        unit::{IntervalUnit, Magnitude},
    },
};

/// A value on a canonical index axis.
pub(crate) trait AxisPoint: Copy + Debug + Send + Sync + 'static {
    /// Total order used for sorting.
    fn axis_cmp(&self, other: &Self) -> Ordering;

    /// Whether two values denote the same index point.
    fn same_point(self, other: Self) -> bool;

    /// `self - earlier`.
    fn delta(self, earlier: Self) -> Self;

    /// Common divisor of positive differences, if one exists.
    fn common_divisor(deltas: &[Self]) -> Option<Self>;

    /// `k` such that `self == anchor + k * step`, if `self` lies on that grid
    /// at or after `anchor`.
    fn grid_offset(self, anchor: Self, step: Self) -> Option<u64>;

    /// `anchor + k * step`.
    fn grid_point(anchor: Self, step: Self, k: u64) -> Self;

    /// Number of whole steps from `lo` to `hi` (rounded down).
    fn steps_between(lo: Self, hi: Self, step: Self) -> u64;

    /// Name a divisor on an axis of the given scale.
    fn to_interval(self, scale: AxisScale) -> Interval;

    /// Length of a regular interval on an axis of the given scale, if it is
    /// representable there.
    fn from_interval(interval: Interval, scale: AxisScale) -> Option<Self>;

    /// Decoded value for reports and callbacks.
    fn index_value(self, kind: IndexKind) -> IndexValue;

    /// Rebuild an Arrow column of `data_type` from canonical values.
    fn materialize(kind: IndexKind, data_type: &DataType, points: &[Self]) -> Result<ArrayRef>;
}

impl AxisPoint for i64 {
    fn axis_cmp(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn same_point(self, other: Self) -> bool {
        self == other
    }

    fn delta(self, earlier: Self) -> Self {
        self.saturating_sub(earlier)
    }

    fn common_divisor(deltas: &[Self]) -> Option<Self> {
        gcd::exact_gcd(deltas.iter().copied())
    }

    fn grid_offset(self, anchor: Self, step: Self) -> Option<u64> {
        let d = self.checked_sub(anchor)?;
        if d < 0 || step <= 0 || d % step != 0 {
            return None;
        }
        u64::try_from(d / step).ok()
    }

    fn grid_point(anchor: Self, step: Self, k: u64) -> Self {
        anchor.saturating_add(step.saturating_mul(k as i64))
    }

    fn steps_between(lo: Self, hi: Self, step: Self) -> u64 {
        if hi <= lo || step <= 0 {
            return 0;
        }
        (hi.saturating_sub(lo) / step) as u64
    }

    fn to_interval(self, scale: AxisScale) -> Interval {
        scale
            .ladder()
            .into_iter()
            .rev()
            .find(|(_, len)| self % len == 0)
            .and_then(|(unit, len)| {
                Magnitude::whole((self / len) as u64).map(|magnitude| Interval::Regular {
                    unit,
                    magnitude,
                })
            })
            .unwrap_or_else(|| match Magnitude::whole(self as u64) {
                Some(magnitude) => Interval::Regular {
                    unit: IntervalUnit::Unit,
                    magnitude,
                },
                None => Interval::Irregular,
            })
    }

    fn from_interval(interval: Interval, scale: AxisScale) -> Option<Self> {
        match interval {
            Interval::Regular { unit, magnitude } => scale.exact_len(unit, magnitude),
            _ => None,
        }
    }

    fn index_value(self, kind: IndexKind) -> IndexValue {
        decode_exact(kind, self)
    }

    fn materialize(kind: IndexKind, data_type: &DataType, points: &[Self]) -> Result<ArrayRef> {
        super::materialize_exact(kind, data_type, points)
    }
}

impl AxisPoint for f64 {
    fn axis_cmp(&self, other: &Self) -> Ordering {
        self.total_cmp(other)
    }

    fn same_point(self, other: Self) -> bool {
        (self - other).abs() <= approx_eq_tolerance(self, other)
    }

    fn delta(self, earlier: Self) -> Self {
        self - earlier
    }

    fn common_divisor(deltas: &[Self]) -> Option<Self> {
        gcd::approx_gcd(deltas)
    }

    fn grid_offset(self, anchor: Self, step: Self) -> Option<u64> {
        if step <= 0.0 {
            return None;
        }
        let k = ((self - anchor) / step).round();
        if k < 0.0 || !k.is_finite() {
            return None;
        }
        let point = Self::grid_point(anchor, step, k as u64);
        let tolerance = (GCD_TOLERANCE * step).max(approx_eq_tolerance(self, point));
        ((self - point).abs() <= tolerance).then_some(k as u64)
    }

    fn grid_point(anchor: Self, step: Self, k: u64) -> Self {
        anchor + step * k as f64
    }

    fn steps_between(lo: Self, hi: Self, step: Self) -> u64 {
        if hi <= lo || step <= 0.0 {
            return 0;
        }
        ((hi - lo) / step + GCD_TOLERANCE).floor() as u64
    }

    fn to_interval(self, _scale: AxisScale) -> Interval {
        match Magnitude::approximate(self) {
            Some(magnitude) => Interval::Regular {
                unit: IntervalUnit::Unit,
                magnitude,
            },
            None => Interval::Irregular,
        }
    }

    fn from_interval(interval: Interval, scale: AxisScale) -> Option<Self> {
        match (interval, scale) {
            (
                Interval::Regular {
                    unit: IntervalUnit::Unit,
                    magnitude,
                },
                AxisScale::Unitless,
            ) => Some(magnitude.as_f64()),
            _ => None,
        }
    }

    fn index_value(self, _kind: IndexKind) -> IndexValue {
        IndexValue::Decimal(self)
    }

    fn materialize(_kind: IndexKind, data_type: &DataType, points: &[Self]) -> Result<ArrayRef> {
        super::materialize_approx(data_type, points)
    }
}

/// Distinct values of `values[rows]`, sorted along the axis.
pub(crate) fn sorted_distinct<P: AxisPoint>(values: &[P], rows: &[usize]) -> Vec<P> {
    let mut points: Vec<P> = rows.iter().map(|r| values[*r]).collect();
    points.sort_by(P::axis_cmp);
    points.dedup_by(|later, earlier| earlier.same_point(*later));
    points
}

/// Positive differences between consecutive distinct points.
pub(crate) fn consecutive_deltas<P: AxisPoint>(points: &[P]) -> Vec<P> {
    points.windows(2).map(|w| w[1].delta(w[0])).collect()
}
