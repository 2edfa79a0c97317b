//! Interval inference for keyed panels.
//!
//! The interval of a series is the greatest common divisor of the
//! differences between its consecutive distinct index values, named in the
//! coarsest calendar unit that divides it exactly (see
//! [`AxisScale::ladder`](crate::index::AxisScale::ladder)).
//!
//! At table level, every group's step and every group's offset from the
//! earliest index value in the table must be a multiple of the table
//! interval, so that all groups sit on one shared grid. This is what lets
//! `fill_gaps` with [`FillScope::Global`](crate::gaps::FillScope::Global)
//! align series that start at different points.
//!
//! Outcomes:
//!
//! - fewer than two distinct points everywhere: [`Interval::Unknown`];
//! - no common divisor (possible only on approximate axes), or any group
//!   irregular: [`Interval::Irregular`];
//! - otherwise [`Interval::Regular`].

pub mod gcd;
pub mod unit;

use std::{collections::BTreeMap, fmt};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    index::{
        IndexProjection,
        axis::{AxisPoint, consecutive_deltas, sorted_distinct},
        with_projected,
    },
    key::{KeyTuple, Partition},
};

pub use unit::{IntervalUnit, Magnitude, ParseIntervalError};

/// The step of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Interval {
    /// Observations are whole multiples of `magnitude × unit` apart.
    Regular {
        /// Calendar or clock unit.
        unit: IntervalUnit,
        /// Number of units (a fraction only on approximate axes).
        magnitude: Magnitude,
    },
    /// No common step exists.
    Irregular,
    /// Not enough observations to tell.
    Unknown,
}

impl Interval {
    /// A regular interval of `n` whole units.
    pub fn regular(unit: IntervalUnit, n: u64) -> Self {
        debug_assert!(n > 0, "interval magnitude must be positive");
        Interval::Regular {
            unit,
            magnitude: Magnitude::whole(n).unwrap_or(Magnitude::ONE),
        }
    }

    /// Whether this is a regular interval.
    pub fn is_regular(&self) -> bool {
        matches!(self, Interval::Regular { .. })
    }

    /// The unit of a regular interval.
    pub fn unit(&self) -> Option<IntervalUnit> {
        match self {
            Interval::Regular { unit, .. } => Some(*unit),
            _ => None,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interval::Regular { unit, magnitude } => write!(f, "{magnitude}{}", unit.symbol()),
            Interval::Irregular => f.write_str("!"),
            Interval::Unknown => f.write_str("?"),
        }
    }
}

/// Result of step inference on the canonical axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum StepInference<P> {
    Regular(P),
    Irregular,
    Unknown,
}

impl<P: AxisPoint> StepInference<P> {
    fn into_interval(self, projection: &IndexProjection) -> Interval {
        match self {
            StepInference::Regular(step) => step.to_interval(projection.scale()),
            StepInference::Irregular => Interval::Irregular,
            StepInference::Unknown => Interval::Unknown,
        }
    }
}

/// Infer the interval of a single series: every row of `projection`, no keys.
pub fn infer_interval(projection: &IndexProjection) -> Interval {
    with_projected!(projection, values => {
        let rows: Vec<usize> = (0..values.len()).collect();
        series_step(values.as_slice(), &rows).into_interval(projection)
    })
}

/// Infer the interval of every group of `partition` independently.
pub fn infer_group_intervals(
    projection: &IndexProjection,
    partition: &Partition,
) -> BTreeMap<KeyTuple, Interval> {
    with_projected!(projection, values => {
        let groups: Vec<(&KeyTuple, &Vec<usize>)> = partition.groups().iter().collect();
        groups
            .par_iter()
            .map(|(key, rows)| {
                let step = series_step(values.as_slice(), rows);
                ((*key).clone(), step.into_interval(projection))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .collect()
    })
}

/// Infer the single interval shared by all groups of `partition`.
///
/// Any irregular group makes the table irregular; groups with fewer than two
/// distinct points contribute only their offset on the shared grid.
pub fn table_interval(projection: &IndexProjection, partition: &Partition) -> Interval {
    with_projected!(projection, values => {
        table_step(values.as_slice(), partition).into_interval(projection)
    })
}

/// Step of one series made of `values[rows]`.
pub(crate) fn series_step<P: AxisPoint>(values: &[P], rows: &[usize]) -> StepInference<P> {
    let points = sorted_distinct(values, rows);
    if points.len() < 2 {
        return StepInference::Unknown;
    }
    match P::common_divisor(&consecutive_deltas(&points)) {
        Some(step) => StepInference::Regular(step),
        None => StepInference::Irregular,
    }
}

/// Step of the shared grid across every group of `partition`.
pub(crate) fn table_step<P: AxisPoint>(values: &[P], partition: &Partition) -> StepInference<P> {
    let groups: Vec<&Vec<usize>> = partition.groups().values().collect();

    // (earliest point, step) per non-empty group.
    let per_group: Vec<(P, StepInference<P>)> = groups
        .par_iter()
        .filter_map(|rows| {
            let first = rows.iter().map(|r| values[*r]).min_by(P::axis_cmp)?;
            Some((first, series_step(values, rows)))
        })
        .collect();

    let irregular = per_group
        .iter()
        .filter(|(_, step)| matches!(step, StepInference::Irregular))
        .count();
    if irregular > 0 {
        log::debug!("{irregular} of {} groups are irregular", per_group.len());
        return StepInference::Irregular;
    }

    let Some(origin) = per_group
        .iter()
        .map(|(first, _)| *first)
        .min_by(P::axis_cmp)
    else {
        return StepInference::Unknown;
    };

    let mut candidates: Vec<P> = per_group
        .iter()
        .filter_map(|(_, step)| match step {
            StepInference::Regular(step) => Some(*step),
            _ => None,
        })
        .collect();
    let regular_groups = candidates.len();
    candidates.extend(
        per_group
            .iter()
            .filter(|(first, _)| !first.same_point(origin))
            .map(|(first, _)| first.delta(origin)),
    );

    if candidates.is_empty() {
        return StepInference::Unknown;
    }

    match P::common_divisor(&candidates) {
        Some(step) => StepInference::Regular(step),
        None => {
            log::warn!(
                "{regular_groups} regular group(s) share no common step on one grid; \
                 treating the table as irregular"
            );
            StepInference::Irregular
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        index::{IndexKind, classify_index},
        key::partition_by_key,
    };
    use arrow::{
        array::{ArrayRef, Date32Array, Float64Array, Int64Array, RecordBatch, StringArray},
        datatypes::{DataType, Field, Schema},
    };
    use std::sync::Arc;

    fn keyed(keys: &[&str], index: ArrayRef) -> (IndexProjection, Partition) {
        let schema = Schema::new(vec![
            Field::new("k", DataType::Utf8, false),
            Field::new("t", index.data_type().clone(), false),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(StringArray::from(keys.to_vec())), index.clone()],
        )
        .unwrap();
        let kind = IndexKind::infer(batch.schema().field(1)).unwrap();
        let projection = classify_index("t", index.as_ref(), kind).unwrap();
        let partition = partition_by_key(&batch, &["k"]).unwrap();
        (projection, partition)
    }

    #[test]
    fn single_series_intervals() {
        let proj = classify_index(
            "t",
            &Int64Array::from(vec![1, 3, 7, 9]),
            IndexKind::Ordinal,
        )
        .unwrap();
        assert_eq!(infer_interval(&proj), Interval::regular(IntervalUnit::Unit, 2));

        let proj = classify_index("t", &Int64Array::from(vec![5, 5]), IndexKind::Ordinal).unwrap();
        assert_eq!(infer_interval(&proj), Interval::Unknown);

        let proj =
            classify_index("t", &Int64Array::from(Vec::<i64>::new()), IndexKind::Ordinal).unwrap();
        assert_eq!(infer_interval(&proj), Interval::Unknown);
    }

    #[test]
    fn daily_dates_are_one_day() {
        let proj = classify_index("t", &Date32Array::from(vec![0, 1, 2, 5]), IndexKind::Date)
            .unwrap();
        assert_eq!(infer_interval(&proj), Interval::regular(IntervalUnit::Day, 1));

        let weekly = classify_index("t", &Date32Array::from(vec![0, 7, 21]), IndexKind::Date)
            .unwrap();
        assert_eq!(infer_interval(&weekly), Interval::regular(IntervalUnit::Week, 1));
    }

    #[test]
    fn decimal_years_are_one_twelfth() {
        let values: Vec<f64> = [0, 1, 2, 4, 7].iter().map(|m| 2000.0 + *m as f64 / 12.0).collect();
        let proj = classify_index("t", &Float64Array::from(values), IndexKind::Decimal).unwrap();
        assert_eq!(infer_interval(&proj), "1/12".parse().unwrap());
    }

    #[test]
    fn per_group_and_table_intervals() {
        let (proj, part) = keyed(
            &["a", "a", "a", "b", "b"],
            Arc::new(Int64Array::from(vec![2010, 2012, 2014, 2011, 2013])),
        );
        let groups = infer_group_intervals(&proj, &part);
        assert!(groups.values().all(|i| *i == Interval::regular(IntervalUnit::Year, 2)));
        // Offsets of one year between the groups refine the shared grid.
        assert_eq!(table_interval(&proj, &part), Interval::regular(IntervalUnit::Year, 1));
    }

    #[test]
    fn single_observation_groups_are_unknown() {
        let (proj, part) = keyed(&["a", "b"], Arc::new(Int64Array::from(vec![7, 7])));
        let groups = infer_group_intervals(&proj, &part);
        assert!(groups.values().all(|i| *i == Interval::Unknown));
        assert_eq!(table_interval(&proj, &part), Interval::Unknown);
    }

    #[test]
    fn irregular_group_makes_table_irregular() {
        let (proj, part) = keyed(
            &["a", "a", "a", "b", "b"],
            Arc::new(Float64Array::from(vec![0.0, 1.0, std::f64::consts::PI, 0.0, 1.0])),
        );
        let groups = infer_group_intervals(&proj, &part);
        assert_eq!(groups.len(), 2);
        assert_eq!(table_interval(&proj, &part), Interval::Irregular);
    }
}
