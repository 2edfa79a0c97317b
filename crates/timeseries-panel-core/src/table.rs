//! Panel tables: an Arrow batch plus its declared index and key.
//!
//! [`PanelTable::try_new`] is the single entry point that ties the other
//! modules together:
//!
//! 1. resolve the index kind (declared calendar, field metadata, or type);
//! 2. project the index onto its canonical axis;
//! 3. partition rows by key;
//! 4. reject duplicated (key, index) pairs;
//! 5. infer the table interval once, unless the spec declares the table
//!    irregular.
//!
//! The resulting value is immutable. Operations that change rows
//! ([`PanelTable::fill_gaps`]) return a new table.

use std::collections::BTreeMap;

use arrow::{
    array::{Array, AsArray, Float64Array, RecordBatch},
    compute::cast,
    datatypes::{DataType, Float64Type},
};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    difference::Difference,
    error::{ArrowSnafu, InvalidIndexColumnSnafu, InvalidParameterSnafu, Result},
    gaps::{self, FillOptions, FillScope, GapRun, GapSummary},
    index::{
        Calendar, IndexKind, IndexProjection, IndexValue, axis::AxisPoint, classify_index,
        with_projected,
    },
    interval::{self, Interval},
    key::{KeyTuple, Partition, partition_by_key},
    validity::check_validity,
};

fn default_regular() -> bool {
    true
}

/// Which columns of a batch form the index and the key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PanelSpec {
    /// Name of the index column (for example `"date"` or `"ts"`).
    pub index_column: String,

    /// Key columns identifying each series, in order. Empty for a single series.
    #[serde(default)]
    pub key_columns: Vec<String>,

    /// Calendar period semantics for the index column, overriding field
    /// metadata and type-based inference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar: Option<Calendar>,

    /// Whether to infer a regular interval. `false` declares the table
    /// irregular up front.
    #[serde(default = "default_regular")]
    pub regular: bool,
}

impl PanelSpec {
    /// A spec for a single series indexed by `index_column`.
    pub fn new(index_column: impl Into<String>) -> Self {
        PanelSpec {
            index_column: index_column.into(),
            key_columns: Vec::new(),
            calendar: None,
            regular: true,
        }
    }

    /// Identify series by these key columns.
    pub fn with_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_columns = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Interpret the index column as calendar periods.
    pub fn with_calendar(mut self, calendar: Calendar) -> Self {
        self.calendar = Some(calendar);
        self
    }

    /// Declare the table irregular; interval inference is skipped.
    pub fn irregular(mut self) -> Self {
        self.regular = false;
        self
    }
}

/// A validated keyed time-series table.
#[derive(Debug, Clone)]
pub struct PanelTable {
    batch: RecordBatch,
    spec: PanelSpec,
    projection: IndexProjection,
    partition: Partition,
    interval: Interval,
}

impl PanelTable {
    /// Validate `batch` against `spec` and infer its interval.
    ///
    /// # Errors
    /// - [`PanelError::InvalidIndexColumn`](crate::PanelError::InvalidIndexColumn)
    ///   / [`PanelError::InvalidKeyColumn`](crate::PanelError::InvalidKeyColumn)
    ///   for unknown column names, or an index column also listed as a key.
    /// - [`PanelError::UnsupportedIndexType`](crate::PanelError::UnsupportedIndexType)
    ///   / [`PanelError::MissingIndexValue`](crate::PanelError::MissingIndexValue)
    ///   from index classification.
    /// - [`PanelError::DuplicateKeyIndex`](crate::PanelError::DuplicateKeyIndex)
    ///   listing every duplicated (key, index) pair.
    pub fn try_new(batch: RecordBatch, spec: PanelSpec) -> Result<Self> {
        let schema = batch.schema();
        let (position, field) = schema
            .column_with_name(&spec.index_column)
            .context(InvalidIndexColumnSnafu {
                column: spec.index_column.as_str(),
            })?;
        ensure!(
            !spec.key_columns.contains(&spec.index_column),
            InvalidParameterSnafu {
                message: format!("column {} cannot be both index and key", spec.index_column),
            }
        );

        let kind = match spec.calendar {
            Some(calendar) => IndexKind::from(calendar),
            None => IndexKind::infer(field)?,
        };
        let projection = classify_index(&spec.index_column, batch.column(position).as_ref(), kind)?;

        let keys: Vec<&str> = spec.key_columns.iter().map(String::as_str).collect();
        let partition = partition_by_key(&batch, &keys)?;

        check_validity(&projection, &partition)?;

        let interval = if spec.regular {
            interval::table_interval(&projection, &partition)
        } else {
            Interval::Irregular
        };

        log::debug!(
            "panel of {} rows, {} groups, {} index, interval {interval}",
            batch.num_rows(),
            partition.len(),
            kind
        );

        Ok(PanelTable {
            batch,
            spec,
            projection,
            partition,
            interval,
        })
    }

    /// The underlying batch.
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Consume the table, returning the underlying batch.
    pub fn into_batch(self) -> RecordBatch {
        self.batch
    }

    /// The spec the table was built with.
    pub fn spec(&self) -> &PanelSpec {
        &self.spec
    }

    /// Resolved index kind.
    pub fn index_kind(&self) -> IndexKind {
        self.projection.kind()
    }

    /// Canonical index projection.
    pub fn projection(&self) -> &IndexProjection {
        &self.projection
    }

    /// Rows grouped by key.
    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Table interval, computed at construction.
    pub fn interval(&self) -> Interval {
        self.interval
    }

    /// Whether the table interval is regular.
    pub fn is_regular(&self) -> bool {
        self.interval.is_regular()
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    /// Names of columns that are neither index nor key.
    pub fn measure_columns(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .filter(|name| *name != self.spec.index_column && !self.spec.key_columns.contains(name))
            .collect()
    }

    /// Interval of each group inferred independently.
    pub fn group_intervals(&self) -> BTreeMap<KeyTuple, Interval> {
        interval::infer_group_intervals(&self.projection, &self.partition)
    }

    /// Decoded index value of `row`.
    pub fn index_value(&self, row: usize) -> Option<IndexValue> {
        (row < self.num_rows()).then(|| self.projection.value_at(row))
    }

    /// See [`gaps::fill_gaps`].
    pub fn fill_gaps(&self, options: &FillOptions) -> Result<PanelTable> {
        gaps::fill_gaps(self, options)
    }

    /// See [`gaps::count_gaps`].
    pub fn count_gaps(&self, interval: Option<Interval>, scope: FillScope) -> Result<Vec<GapRun>> {
        gaps::count_gaps(self, interval, scope)
    }

    /// See [`gaps::scan_gaps`].
    pub fn scan_gaps(
        &self,
        interval: Option<Interval>,
        scope: FillScope,
    ) -> Result<Vec<(KeyTuple, IndexValue)>> {
        gaps::scan_gaps(self, interval, scope)
    }

    /// See [`gaps::has_gaps`].
    pub fn has_gaps(
        &self,
        interval: Option<Interval>,
        scope: FillScope,
    ) -> Result<BTreeMap<KeyTuple, bool>> {
        gaps::has_gaps(self, interval, scope)
    }

    /// See [`gaps::summarize_gaps`].
    pub fn summarize_gaps(
        &self,
        interval: Option<Interval>,
        scope: FillScope,
    ) -> Result<Vec<GapSummary>> {
        gaps::summarize_gaps(self, interval, scope)
    }

    /// See [`gaps::new_data`].
    pub fn new_data(&self, n: usize) -> Result<RecordBatch> {
        gaps::new_data(self, n)
    }

    /// Lagged differences of a numeric column, taken within each group along
    /// the index.
    ///
    /// The result is aligned with the table's rows. Values are cast to
    /// `Float64` first; the first `lag · differences` rows of each group are
    /// padded with `fill`.
    ///
    /// # Errors
    /// [`PanelError::InvalidParameter`](crate::PanelError::InvalidParameter)
    /// for an unknown column or invalid lag/differences, and
    /// [`PanelError::Arrow`](crate::PanelError::Arrow) if the column cannot
    /// be cast to `Float64`.
    pub fn difference(
        &self,
        column: &str,
        lag: usize,
        differences: usize,
        fill: Option<f64>,
    ) -> Result<Float64Array> {
        let op = Difference::new(lag, differences)?.with_fill(fill);
        let array = self
            .batch
            .column_by_name(column)
            .context(InvalidParameterSnafu {
                message: format!("column {column} not found"),
            })?;
        let floats = cast(array.as_ref(), &DataType::Float64).context(ArrowSnafu)?;
        let floats = floats.as_primitive::<Float64Type>();
        let x: Vec<Option<f64>> = (0..floats.len())
            .map(|i| (!floats.is_null(i)).then(|| floats.value(i)))
            .collect();

        let mut out: Vec<Option<f64>> = vec![None; x.len()];
        with_projected!(self.projection, values => {
            for rows in self.partition.groups().values() {
                difference_group(&op, &x, values.as_slice(), rows, &mut out);
            }
        });
        Ok(Float64Array::from(out))
    }
}

fn difference_group<P: AxisPoint>(
    op: &Difference,
    x: &[Option<f64>],
    index: &[P],
    rows: &[usize],
    out: &mut [Option<f64>],
) {
    let group_x: Vec<Option<f64>> = rows.iter().map(|r| x[*r]).collect();
    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by(|a, b| index[rows[*a]].axis_cmp(&index[rows[*b]]));
    for (pos, value) in op.apply_permuted(&group_x, &order).into_iter().enumerate() {
        out[rows[pos]] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PanelError, index::CALENDAR_METADATA_KEY, interval::IntervalUnit};
    use arrow::{
        array::{Date32Array, Int64Array, StringArray, TimestampSecondArray},
        datatypes::{Field, Schema, TimeUnit},
    };
    use std::{collections::HashMap, sync::Arc};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn batch(fields: Vec<Field>, columns: Vec<Arc<dyn Array>>) -> RecordBatch {
        RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).unwrap()
    }

    #[test]
    fn spec_serde_defaults() -> TestResult {
        let spec: PanelSpec = serde_json::from_str(r#"{"index_column": "month"}"#)?;
        assert_eq!(spec, PanelSpec::new("month"));

        let spec: PanelSpec = serde_json::from_str(
            r#"{"index_column": "m", "key_columns": ["k"], "calendar": "yearmonth", "regular": false}"#,
        )?;
        assert_eq!(
            spec,
            PanelSpec::new("m")
                .with_keys(["k"])
                .with_calendar(Calendar::YearMonth)
                .irregular()
        );
        Ok(())
    }

    #[test]
    fn try_new_validates_columns() {
        let b = batch(
            vec![Field::new("t", DataType::Int64, false)],
            vec![Arc::new(Int64Array::from(vec![1, 2]))],
        );
        assert!(matches!(
            PanelTable::try_new(b.clone(), PanelSpec::new("x")),
            Err(PanelError::InvalidIndexColumn { .. })
        ));
        assert!(matches!(
            PanelTable::try_new(b.clone(), PanelSpec::new("t").with_keys(["k"])),
            Err(PanelError::InvalidKeyColumn { .. })
        ));
        assert!(matches!(
            PanelTable::try_new(b, PanelSpec::new("t").with_keys(["t"])),
            Err(PanelError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn try_new_rejects_duplicates() {
        let b = batch(
            vec![
                Field::new("k", DataType::Utf8, false),
                Field::new("t", DataType::Int64, false),
            ],
            vec![
                Arc::new(StringArray::from(vec!["a", "a", "b"])),
                Arc::new(Int64Array::from(vec![1, 1, 1])),
            ],
        );
        let err = PanelTable::try_new(b, PanelSpec::new("t").with_keys(["k"])).unwrap_err();
        assert_eq!(err.violations().map(|v| v.len()), Some(1));
    }

    #[test]
    fn duplicate_zoned_timestamps_rejected() {
        let tokyo = TimestampSecondArray::from(vec![0, 0]).with_timezone("Asia/Tokyo");
        let dt = tokyo.data_type().clone();
        let b = batch(vec![Field::new("ts", dt, false)], vec![Arc::new(tokyo)]);
        let err = PanelTable::try_new(b, PanelSpec::new("ts")).unwrap_err();
        assert!(matches!(err, PanelError::DuplicateKeyIndex { .. }));
    }

    #[test]
    fn calendar_from_metadata_or_spec() -> TestResult {
        // 2020-01-15, 2020-02-03, 2020-04-20: monthly with a gap.
        let days = vec![18276, 18295, 18372];
        let plain = Field::new("m", DataType::Date32, false);

        let b = batch(vec![plain.clone()], vec![Arc::new(Date32Array::from(days.clone()))]);
        let by_spec = PanelTable::try_new(b, PanelSpec::new("m").with_calendar(Calendar::YearMonth))?;
        assert_eq!(by_spec.index_kind(), IndexKind::YearMonth);
        assert_eq!(by_spec.interval(), Interval::regular(IntervalUnit::Month, 1));

        let tagged = plain.with_metadata(HashMap::from([(
            CALENDAR_METADATA_KEY.to_string(),
            "yearmonth".to_string(),
        )]));
        let b = batch(vec![tagged], vec![Arc::new(Date32Array::from(days))]);
        let by_meta = PanelTable::try_new(b, PanelSpec::new("m"))?;
        assert_eq!(by_meta.interval(), by_spec.interval());
        assert_eq!(by_meta.count_gaps(None, FillScope::PerGroup)?.len(), 1);
        Ok(())
    }

    #[test]
    fn irregular_spec_skips_inference() -> TestResult {
        let b = batch(
            vec![Field::new("t", DataType::Int64, false)],
            vec![Arc::new(Int64Array::from(vec![1, 2, 3]))],
        );
        let table = PanelTable::try_new(b, PanelSpec::new("t").irregular())?;
        assert_eq!(table.interval(), Interval::Irregular);
        assert!(!table.is_regular());
        assert!(matches!(
            table.fill_gaps(&FillOptions::default()),
            Err(PanelError::CannotInferInterval { .. })
        ));
        Ok(())
    }

    #[test]
    fn difference_per_group_in_index_order() -> TestResult {
        let b = batch(
            vec![
                Field::new("k", DataType::Utf8, false),
                Field::new("t", DataType::Int64, false),
                Field::new("v", DataType::Int64, false),
            ],
            vec![
                Arc::new(StringArray::from(vec!["a", "b", "a", "a", "b"])),
                Arc::new(Int64Array::from(vec![3, 1, 1, 2, 2])),
                Arc::new(Int64Array::from(vec![9, 10, 1, 4, 15])),
            ],
        );
        let table = PanelTable::try_new(b, PanelSpec::new("t").with_keys(["k"]))?;
        let d = table.difference("v", 1, 1, None)?;
        let got: Vec<Option<f64>> = d.iter().collect();
        assert_eq!(got, vec![Some(5.0), None, None, Some(3.0), Some(5.0)]);

        assert!(matches!(
            table.difference("nope", 1, 1, None),
            Err(PanelError::InvalidParameter { .. })
        ));
        Ok(())
    }

    #[test]
    fn measure_columns_and_index_values() -> TestResult {
        let b = batch(
            vec![
                Field::new("k", DataType::Utf8, false),
                Field::new("ts", DataType::Timestamp(TimeUnit::Second, None), false),
                Field::new("v", DataType::Int64, false),
            ],
            vec![
                Arc::new(StringArray::from(vec!["a", "a"])),
                Arc::new(TimestampSecondArray::from(vec![0, 3600])),
                Arc::new(Int64Array::from(vec![1, 2])),
            ],
        );
        let table = PanelTable::try_new(b, PanelSpec::new("ts").with_keys(["k"]))?;
        assert_eq!(table.measure_columns(), vec!["v".to_string()]);
        assert_eq!(table.interval(), Interval::regular(IntervalUnit::Hour, 1));
        assert_eq!(table.index_value(1).map(|v| v.to_string()), Some("1970-01-01T01:00:00+00:00".to_string()));
        assert_eq!(table.index_value(2), None);
        Ok(())
    }
}
