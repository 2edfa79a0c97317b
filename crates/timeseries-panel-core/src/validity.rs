//! Uniqueness of (key, index) pairs.
//!
//! A panel is valid when no key tuple has two rows at the same index point.
//! On approximate axes "the same point" means within
//! [`APPROX_EQ_ULPS`](crate::index::APPROX_EQ_ULPS) units in the last place
//! of the first value of a run of sorted values.

use std::fmt;

use rayon::prelude::*;
use serde::Serialize;

use crate::{
    error::{PanelError, Result},
    index::{IndexProjection, IndexValue, axis::AxisPoint, with_projected},
    key::{KeyTuple, Partition},
};

/// One duplicated (key, index) pair and every row carrying it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateEntry {
    /// Key of the offending group.
    pub key: KeyTuple,
    /// Index value occurring more than once.
    pub index: IndexValue,
    /// Ascending row ids carrying this pair (at least two).
    pub rows: Vec<usize>,
}

impl fmt::Display for DuplicateEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key {} at index {} (rows {:?})", self.key, self.index, self.rows)
    }
}

/// Fail with [`PanelError::DuplicateKeyIndex`] if any (key, index) pair repeats.
pub fn check_validity(projection: &IndexProjection, partition: &Partition) -> Result<()> {
    let violations = find_duplicates(projection, partition);
    if violations.is_empty() {
        Ok(())
    } else {
        log::debug!("found {} duplicated (key, index) pairs", violations.len());
        Err(PanelError::DuplicateKeyIndex { violations })
    }
}

/// Per-row flag: does this row share its (key, index) pair with another row?
pub fn duplicated_rows(projection: &IndexProjection, partition: &Partition) -> Vec<bool> {
    let mut flags = vec![false; projection.len()];
    for entry in find_duplicates(projection, partition) {
        for row in entry.rows {
            flags[row] = true;
        }
    }
    flags
}

/// Every duplicated pair, in key order and then index order.
pub fn find_duplicates(projection: &IndexProjection, partition: &Partition) -> Vec<DuplicateEntry> {
    with_projected!(projection, values => {
        let groups: Vec<(&KeyTuple, &Vec<usize>)> = partition.groups().iter().collect();
        groups
            .par_iter()
            .flat_map_iter(|(key, rows)| {
                group_duplicates(values.as_slice(), rows)
                    .into_iter()
                    .map(move |rows| DuplicateEntry {
                        key: (*key).clone(),
                        index: projection.value_at(rows[0]),
                        rows,
                    })
            })
            .collect()
    })
}

/// Runs of rows sharing an index point within one group.
fn group_duplicates<P: AxisPoint>(values: &[P], rows: &[usize]) -> Vec<Vec<usize>> {
    let mut sorted = rows.to_vec();
    sorted.sort_by(|a, b| values[*a].axis_cmp(&values[*b]).then(a.cmp(b)));

    let mut runs = Vec::new();
    let mut start = 0;
    while start < sorted.len() {
        let anchor = values[sorted[start]];
        let mut end = start + 1;
        while end < sorted.len() && anchor.same_point(values[sorted[end]]) {
            end += 1;
        }
        if end - start > 1 {
            let mut run = sorted[start..end].to_vec();
            run.sort_unstable();
            runs.push(run);
        }
        start = end;
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        index::{IndexKind, classify_index},
        key::{KeyValue, partition_by_key},
    };
    use arrow::{
        array::{Float64Array, Int64Array, RecordBatch, StringArray},
        datatypes::{DataType, Field, Schema},
    };
    use std::sync::Arc;

    fn panel(keys: Vec<&str>, t: Vec<i64>) -> (IndexProjection, Partition) {
        let schema = Schema::new(vec![
            Field::new("k", DataType::Utf8, false),
            Field::new("t", DataType::Int64, false),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(StringArray::from(keys)),
                Arc::new(Int64Array::from(t)),
            ],
        )
        .unwrap();
        let proj = classify_index("t", batch.column(1).as_ref(), IndexKind::Ordinal).unwrap();
        let part = partition_by_key(&batch, &["k"]).unwrap();
        (proj, part)
    }

    #[test]
    fn unique_pairs_are_valid() {
        let (proj, part) = panel(vec!["a", "a", "b", "b"], vec![1, 2, 1, 2]);
        assert!(check_validity(&proj, &part).is_ok());
        assert_eq!(duplicated_rows(&proj, &part), vec![false; 4]);
    }

    #[test]
    fn duplicates_report_key_index_and_rows() {
        let (proj, part) = panel(vec!["a", "b", "a", "a", "b"], vec![1, 1, 2, 1, 3]);
        let err = check_validity(&proj, &part).unwrap_err();
        let violations = err.violations().unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].key, KeyTuple(vec![KeyValue::from("a")]));
        assert_eq!(violations[0].index, IndexValue::Ordinal(1));
        assert_eq!(violations[0].rows, vec![0, 3]);
        assert_eq!(
            duplicated_rows(&proj, &part),
            vec![true, false, false, true, false]
        );
    }

    #[test]
    fn approximate_duplicates_use_epsilon() {
        let schema = Schema::new(vec![Field::new("t", DataType::Float64, false)]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(Float64Array::from(vec![0.1 + 0.2, 0.3, 0.4]))],
        )
        .unwrap();
        let proj = classify_index("t", batch.column(0).as_ref(), IndexKind::Decimal).unwrap();
        let part = partition_by_key(&batch, &[]).unwrap();
        let dups = find_duplicates(&proj, &part);
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].rows, vec![0, 1]);
    }

    #[test]
    fn epoch_scale_seconds_stay_distinct() {
        let schema = Schema::new(vec![Field::new("t", DataType::Float64, false)]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(Float64Array::from(vec![1.6e9, 1.6e9 + 1.0, 1.6e9 + 1e-3]))],
        )
        .unwrap();
        let proj = classify_index("t", batch.column(0).as_ref(), IndexKind::Decimal).unwrap();
        let part = partition_by_key(&batch, &[]).unwrap();
        assert!(check_validity(&proj, &part).is_ok());
    }
}
