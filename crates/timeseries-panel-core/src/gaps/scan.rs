//! Reporting gaps without materializing them, and extending series forward.

use std::{collections::BTreeMap, sync::Arc};

use arrow::{
    array::{RecordBatch, UInt32Array},
    compute::take,
    datatypes::Schema,
};
use serde::Serialize;
use snafu::prelude::*;

use super::{
    FillScope, GroupGrid, effective_step, ensure_materializable, extent, group_grids,
    total_missing,
};
use crate::{
    error::{ArrowSnafu, EmptyTableSnafu, InvalidParameterSnafu, PanelError, Result},
    index::{IndexKind, IndexValue, axis::AxisPoint, with_projected},
    interval::Interval,
    key::KeyTuple,
    table::PanelTable,
};

/// A contiguous run of missing points in one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GapRun {
    /// Key of the group.
    pub key: KeyTuple,
    /// First missing point of the run.
    pub from: IndexValue,
    /// Last missing point of the run.
    pub to: IndexValue,
    /// Number of missing points in the run.
    pub missing: u64,
}

/// How completely one group covers its grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GapSummary {
    /// Key of the group.
    pub key: KeyTuple,
    /// Grid points between the scope's bounds.
    pub expected: u64,
    /// Grid points the group observes.
    pub observed: u64,
    /// Share of grid points observed, in `[0.0, 1.0]`.
    pub coverage: f64,
    /// Length of the longest run of missing points.
    pub longest_gap: u64,
}

/// Every contiguous run of missing points, in key then index order.
///
/// `interval` overrides the table interval as in
/// [`FillOptions::interval`](super::FillOptions::interval).
pub fn count_gaps(
    table: &PanelTable,
    interval: Option<Interval>,
    scope: FillScope,
) -> Result<Vec<GapRun>> {
    with_projected!(table.projection(), values => {
        let step = effective_step(table, interval)?;
        let kind = table.index_kind();
        let grids = group_grids(table, values.as_slice(), step, scope)?;
        Ok(grids.iter().flat_map(|grid| runs_of(grid, kind)).collect())
    })
}

fn runs_of<P: AxisPoint>(grid: &GroupGrid<'_, P>, kind: IndexKind) -> Vec<GapRun> {
    grid.coverage
        .missing_runs(&grid.span)
        .into_iter()
        .map(|run| GapRun {
            key: grid.key.clone(),
            from: P::grid_point(grid.anchor, grid.step, *run.start()).index_value(kind),
            to: P::grid_point(grid.anchor, grid.step, *run.end()).index_value(kind),
            missing: run.end() - run.start() + 1,
        })
        .collect()
}

/// Every missing point, in key then index order.
pub fn scan_gaps(
    table: &PanelTable,
    interval: Option<Interval>,
    scope: FillScope,
) -> Result<Vec<(KeyTuple, IndexValue)>> {
    with_projected!(table.projection(), values => {
        let step = effective_step(table, interval)?;
        let kind = table.index_kind();
        let grids = group_grids(table, values.as_slice(), step, scope)?;
        ensure_materializable(total_missing(&grids))?;
        Ok(grids
            .iter()
            .flat_map(|grid| {
                grid.missing_points()
                    .into_iter()
                    .map(|p| (grid.key.clone(), p.index_value(kind)))
            })
            .collect())
    })
}

/// Whether each group has at least one missing point.
pub fn has_gaps(
    table: &PanelTable,
    interval: Option<Interval>,
    scope: FillScope,
) -> Result<BTreeMap<KeyTuple, bool>> {
    with_projected!(table.projection(), values => {
        let step = effective_step(table, interval)?;
        let grids = group_grids(table, values.as_slice(), step, scope)?;
        Ok(grids
            .iter()
            .map(|grid| (grid.key.clone(), grid.coverage.missing_count(&grid.span) > 0))
            .collect())
    })
}

/// Coverage of every group's grid, in key order.
pub fn summarize_gaps(
    table: &PanelTable,
    interval: Option<Interval>,
    scope: FillScope,
) -> Result<Vec<GapSummary>> {
    with_projected!(table.projection(), values => {
        let step = effective_step(table, interval)?;
        let grids = group_grids(table, values.as_slice(), step, scope)?;
        Ok(grids
            .iter()
            .map(|grid| GapSummary {
                key: grid.key.clone(),
                expected: grid.span.len(),
                observed: grid.coverage.observed(&grid.span),
                coverage: grid.coverage.coverage_ratio(&grid.span),
                longest_gap: grid.coverage.longest_gap(&grid.span),
            })
            .collect())
    })
}

/// Key and index rows for the `n` steps following each group's last
/// observation, at the table interval.
///
/// The result holds the key columns followed by the index column, in key
/// then index order.
pub fn new_data(table: &PanelTable, n: usize) -> Result<RecordBatch> {
    ensure!(
        n > 0,
        InvalidParameterSnafu {
            message: "new_data needs n >= 1".to_string(),
        }
    );
    ensure!(table.num_rows() > 0, EmptyTableSnafu);
    ensure_materializable((n as u64).saturating_mul(table.partition().len() as u64))?;

    with_projected!(table.projection(), values => {
        extend_batch(table, values.as_slice(), n)
    })
}

fn extend_batch<P: AxisPoint>(table: &PanelTable, values: &[P], n: usize) -> Result<RecordBatch> {
    let step: P = effective_step(table, None)?;

    let mut template: Vec<u32> = Vec::new();
    let mut points: Vec<P> = Vec::new();
    for rows in table.partition().groups().values() {
        let Some((_, last)) = extent(values, rows) else {
            continue;
        };
        let row = u32::try_from(rows[0]).map_err(|_| PanelError::InvalidParameter {
            message: format!("row id {} exceeds the u32 take domain", rows[0]),
        })?;
        for k in 1..=n as u64 {
            template.push(row);
            points.push(P::grid_point(last, step, k));
        }
    }

    let batch = table.batch();
    let schema = batch.schema();
    let template = UInt32Array::from(template);

    let mut fields = Vec::with_capacity(table.spec().key_columns.len() + 1);
    let mut columns = Vec::with_capacity(fields.capacity());
    for name in &table.spec().key_columns {
        let (idx, field) = schema
            .column_with_name(name)
            .context(crate::error::InvalidKeyColumnSnafu { column: name.as_str() })?;
        columns.push(take(batch.column(idx).as_ref(), &template, None).context(ArrowSnafu)?);
        fields.push(field.clone());
    }

    let index_name = &table.spec().index_column;
    let (_, index_field) = schema
        .column_with_name(index_name)
        .context(crate::error::InvalidIndexColumnSnafu {
            column: index_name.as_str(),
        })?;
    columns.push(P::materialize(
        table.index_kind(),
        table.projection().data_type(),
        &points,
    )?);
    fields.push(index_field.clone());

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).context(ArrowSnafu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{interval::IntervalUnit, key::KeyValue, table::PanelSpec};
    use arrow::{
        array::{AsArray, Date32Array, Int64Array, StringArray},
        datatypes::{DataType, Date32Type, Field, Int64Type},
    };
    use chrono::NaiveDate;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn table(keys: Vec<&str>, t: Vec<i64>) -> PanelTable {
        let schema = Schema::new(vec![
            Field::new("k", DataType::Utf8, false),
            Field::new("t", DataType::Int64, false),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(StringArray::from(keys)), Arc::new(Int64Array::from(t))],
        )
        .unwrap();
        PanelTable::try_new(batch, PanelSpec::new("t").with_keys(["k"])).unwrap()
    }

    fn key(k: &str) -> KeyTuple {
        KeyTuple(vec![KeyValue::from(k)])
    }

    #[test]
    fn count_gaps_reports_runs() -> TestResult {
        let t = table(vec!["a", "a", "a", "b", "b"], vec![1, 2, 6, 1, 8]);
        let runs = count_gaps(&t, None, FillScope::PerGroup)?;
        assert_eq!(
            runs,
            vec![
                GapRun {
                    key: key("a"),
                    from: IndexValue::Ordinal(3),
                    to: IndexValue::Ordinal(5),
                    missing: 3,
                },
                GapRun {
                    key: key("b"),
                    from: IndexValue::Ordinal(2),
                    to: IndexValue::Ordinal(7),
                    missing: 6,
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn scan_and_has_gaps_follow_scope() -> TestResult {
        let t = table(vec!["a", "a", "b", "b"], vec![1, 3, 2, 3]);
        let per_group = scan_gaps(&t, None, FillScope::PerGroup)?;
        assert_eq!(per_group, vec![(key("a"), IndexValue::Ordinal(2))]);

        let global = scan_gaps(&t, None, FillScope::Global)?;
        assert_eq!(
            global,
            vec![
                (key("a"), IndexValue::Ordinal(2)),
                (key("b"), IndexValue::Ordinal(1)),
            ]
        );

        let flags = has_gaps(&t, None, FillScope::PerGroup)?;
        assert_eq!(flags.get(&key("a")), Some(&true));
        assert_eq!(flags.get(&key("b")), Some(&false));

        let extend_start = has_gaps(&t, None, FillScope::ExtendStart)?;
        assert_eq!(extend_start.get(&key("b")), Some(&true));
        Ok(())
    }

    #[test]
    fn interval_override_changes_the_grid() -> TestResult {
        let t = table(vec!["a", "a"], vec![0, 4]);
        let runs = count_gaps(&t, Some(Interval::regular(IntervalUnit::Unit, 2)), FillScope::PerGroup)?;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].missing, 1);
        assert_eq!(runs[0].from, IndexValue::Ordinal(2));
        Ok(())
    }

    #[test]
    fn summaries_report_coverage_per_group() -> TestResult {
        let t = table(vec!["a", "a", "a", "b", "b"], vec![1, 2, 6, 2, 3]);
        let summaries = summarize_gaps(&t, None, FillScope::Global)?;
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].key, key("a"));
        assert_eq!((summaries[0].expected, summaries[0].observed), (6, 3));
        assert_eq!(summaries[0].longest_gap, 3);
        assert!((summaries[0].coverage - 0.5).abs() < 1e-12);
        assert_eq!((summaries[1].observed, summaries[1].longest_gap), (2, 3));
        Ok(())
    }

    #[test]
    fn sparse_grids_are_counted_but_not_listed() -> TestResult {
        let t = table(vec!["a", "a"], vec![0, 1 << 27]);
        let every_unit = Some(Interval::regular(IntervalUnit::Unit, 1));

        let runs = count_gaps(&t, every_unit, FillScope::PerGroup)?;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].missing, (1 << 27) - 1);
        assert_eq!(has_gaps(&t, every_unit, FillScope::PerGroup)?.get(&key("a")), Some(&true));
        assert!(matches!(
            scan_gaps(&t, every_unit, FillScope::PerGroup),
            Err(PanelError::TooManyGaps { .. })
        ));

        let beyond = table(vec!["a", "a"], vec![0, 1 << 33]);
        assert!(matches!(
            count_gaps(&beyond, every_unit, FillScope::PerGroup),
            Err(PanelError::GridTooLarge { .. })
        ));
        assert!(matches!(
            new_data(&t, 1 << 27),
            Err(PanelError::TooManyGaps { .. })
        ));
        Ok(())
    }

    #[test]
    fn new_data_extends_each_group() -> TestResult {
        let t = table(vec!["a", "a", "b"], vec![1, 3, 2]);
        let next = new_data(&t, 2)?;
        assert_eq!(next.num_columns(), 2);
        let keys = next.column(0).as_string::<i32>();
        assert_eq!(keys.iter().flatten().collect::<Vec<_>>(), vec!["a", "a", "b", "b"]);
        let idx = next.column(1).as_primitive::<Int64Type>();
        assert_eq!(idx.values().to_vec(), vec![4, 5, 3, 4]);

        assert!(matches!(new_data(&t, 0), Err(PanelError::InvalidParameter { .. })));
        Ok(())
    }

    #[test]
    fn new_data_on_dates_keeps_the_type() -> TestResult {
        let schema = Schema::new(vec![Field::new("d", DataType::Date32, false)]);
        let start = NaiveDate::from_ymd_opt(2024, 2, 27).unwrap();
        let day = crate::index::calendar::epoch_days(start) as i32;
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(Date32Array::from(vec![day, day + 1]))],
        )?;
        let t = PanelTable::try_new(batch, PanelSpec::new("d"))?;
        let next = new_data(&t, 2)?;
        let dates = next.column(0).as_primitive::<Date32Type>();
        assert_eq!(dates.values().to_vec(), vec![day + 2, day + 3]);
        assert_eq!(
            t.projection().value_at(1),
            IndexValue::Date(NaiveDate::from_ymd_opt(2024, 2, 28).unwrap())
        );
        Ok(())
    }
}
