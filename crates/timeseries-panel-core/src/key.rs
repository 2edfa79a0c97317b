//! Key partitioning.
//!
//! The key of a row is the tuple of its values in the declared key columns.
//! [`partition_by_key`] maps every distinct key tuple to the ascending row ids
//! carrying it. Groups iterate in key order; keys compare by value, so two
//! rows with equal text in a `Utf8` and a `LargeUtf8` column are the same key.
//!
//! Nulls are a regular key value ([`KeyValue::Null`]) that sorts first.

use std::{cmp::Ordering, collections::BTreeMap, fmt, hash::Hash};

use arrow::{
    array::{Array, AsArray, RecordBatch},
    datatypes::{
        DataType, Float16Type, Float32Type, Float64Type, Int8Type, Int16Type, Int32Type,
        Int64Type, UInt8Type, UInt16Type, UInt32Type, UInt64Type,
    },
    util::display::{ArrayFormatter, FormatOptions},
};
use arrow_array::{ArrowPrimitiveType, PrimitiveArray};
use serde::{Serialize, Serializer};
use snafu::prelude::*;

use crate::error::{ArrowSnafu, InvalidKeyColumnSnafu, Result};

/// A float with a total order, usable as a key component.
///
/// `-0.0` is normalized to `0.0` and every NaN to one canonical NaN, so
/// equality matches value semantics.
#[derive(Debug, Clone, Copy)]
pub struct KeyFloat(f64);

impl KeyFloat {
    /// Wrap a float.
    pub fn new(value: f64) -> Self {
        if value == 0.0 {
            KeyFloat(0.0)
        } else if value.is_nan() {
            KeyFloat(f64::NAN)
        } else {
            KeyFloat(value)
        }
    }

    /// The wrapped value.
    pub fn get(self) -> f64 {
        self.0
    }
}

impl PartialEq for KeyFloat {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for KeyFloat {}

impl PartialOrd for KeyFloat {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyFloat {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for KeyFloat {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// One component of a key tuple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyValue {
    /// A null key value.
    Null,
    /// A boolean.
    Boolean(bool),
    /// A signed integer.
    Int(i64),
    /// An unsigned integer.
    UInt(u64),
    /// A float.
    Float(KeyFloat),
    /// Text, or the display form of any other Arrow type.
    Text(String),
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Null => f.write_str("NA"),
            KeyValue::Boolean(b) => write!(f, "{b}"),
            KeyValue::Int(v) => write!(f, "{v}"),
            KeyValue::UInt(v) => write!(f, "{v}"),
            KeyValue::Float(v) => write!(f, "{}", v.get()),
            KeyValue::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for KeyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            KeyValue::Null => serializer.serialize_none(),
            KeyValue::Boolean(b) => serializer.serialize_bool(*b),
            KeyValue::Int(v) => serializer.serialize_i64(*v),
            KeyValue::UInt(v) => serializer.serialize_u64(*v),
            KeyValue::Float(v) => serializer.serialize_f64(v.get()),
            KeyValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        KeyValue::Text(value.to_string())
    }
}

impl From<i64> for KeyValue {
    fn from(value: i64) -> Self {
        KeyValue::Int(value)
    }
}

/// The key of one series: its values in the key columns, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct KeyTuple(pub Vec<KeyValue>);

impl KeyTuple {
    /// The key of a table without key columns.
    pub fn empty() -> Self {
        KeyTuple(Vec::new())
    }

    /// Key components.
    pub fn values(&self) -> &[KeyValue] {
        &self.0
    }
}

impl fmt::Display for KeyTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{v}")?;
        }
        f.write_str(")")
    }
}

impl<V: Into<KeyValue>> FromIterator<V> for KeyTuple {
    fn from_iter<T: IntoIterator<Item = V>>(iter: T) -> Self {
        KeyTuple(iter.into_iter().map(Into::into).collect())
    }
}

/// Rows of a table grouped by key tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    key_columns: Vec<String>,
    groups: BTreeMap<KeyTuple, Vec<usize>>,
    row_count: usize,
}

impl Partition {
    /// Names of the key columns, in declaration order.
    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    /// Groups in key order; each row list is ascending.
    pub fn groups(&self) -> &BTreeMap<KeyTuple, Vec<usize>> {
        &self.groups
    }

    /// Rows of the group with the given key.
    pub fn get(&self, key: &KeyTuple) -> Option<&[usize]> {
        self.groups.get(key).map(Vec::as_slice)
    }

    /// Key of the group that owns `row`.
    pub fn group_of(&self, row: usize) -> Option<&KeyTuple> {
        self.groups
            .iter()
            .find(|(_, rows)| rows.binary_search(&row).is_ok())
            .map(|(key, _)| key)
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether there are no groups (only for an empty table with key columns).
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of rows partitioned.
    pub fn row_count(&self) -> usize {
        self.row_count
    }
}

/// Group the rows of `batch` by their values in `key_columns`.
///
/// With no key columns the whole table is one group keyed by the empty tuple
/// (even when the table has no rows).
///
/// # Errors
/// [`PanelError::InvalidKeyColumn`](crate::PanelError::InvalidKeyColumn) if a
/// key column does not exist.
pub fn partition_by_key(batch: &RecordBatch, key_columns: &[&str]) -> Result<Partition> {
    let row_count = batch.num_rows();
    let mut groups: BTreeMap<KeyTuple, Vec<usize>> = BTreeMap::new();

    if key_columns.is_empty() {
        groups.insert(KeyTuple::empty(), (0..row_count).collect());
        return Ok(Partition {
            key_columns: Vec::new(),
            groups,
            row_count,
        });
    }

    let columns = key_columns
        .iter()
        .map(|name| {
            let column = batch
                .column_by_name(name)
                .context(InvalidKeyColumnSnafu { column: *name })?;
            column_key_values(column.as_ref())
        })
        .collect::<Result<Vec<_>>>()?;

    for row in 0..row_count {
        let key = KeyTuple(columns.iter().map(|c| c[row].clone()).collect());
        groups.entry(key).or_default().push(row);
    }

    log::debug!(
        "partitioned {row_count} rows into {} groups by {:?}",
        groups.len(),
        key_columns
    );

    Ok(Partition {
        key_columns: key_columns.iter().map(|s| s.to_string()).collect(),
        groups,
        row_count,
    })
}

/// Key values of every row of `column`.
pub(crate) fn column_key_values(column: &dyn Array) -> Result<Vec<KeyValue>> {
    fn signed<T>(column: &dyn Array) -> Vec<KeyValue>
    where
        T: ArrowPrimitiveType,
        T::Native: Into<i64>,
    {
        let array: &PrimitiveArray<T> = column.as_primitive::<T>();
        array
            .iter()
            .map(|v| v.map_or(KeyValue::Null, |v| KeyValue::Int(v.into())))
            .collect()
    }

    fn unsigned<T>(column: &dyn Array) -> Vec<KeyValue>
    where
        T: ArrowPrimitiveType,
        T::Native: Into<u64>,
    {
        column
            .as_primitive::<T>()
            .iter()
            .map(|v| v.map_or(KeyValue::Null, |v| KeyValue::UInt(v.into())))
            .collect()
    }

    fn float<T>(column: &dyn Array, widen: impl Fn(T::Native) -> f64) -> Vec<KeyValue>
    where
        T: ArrowPrimitiveType,
    {
        column
            .as_primitive::<T>()
            .iter()
            .map(|v| v.map_or(KeyValue::Null, |v| KeyValue::Float(KeyFloat::new(widen(v)))))
            .collect()
    }

    fn text<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Vec<KeyValue> {
        values
            .map(|v| v.map_or(KeyValue::Null, KeyValue::from))
            .collect()
    }

    Ok(match column.data_type() {
        DataType::Null => vec![KeyValue::Null; column.len()],
        DataType::Boolean => column
            .as_boolean()
            .iter()
            .map(|v| v.map_or(KeyValue::Null, KeyValue::Boolean))
            .collect(),
        DataType::Int8 => signed::<Int8Type>(column),
        DataType::Int16 => signed::<Int16Type>(column),
        DataType::Int32 => signed::<Int32Type>(column),
        DataType::Int64 => signed::<Int64Type>(column),
        DataType::UInt8 => unsigned::<UInt8Type>(column),
        DataType::UInt16 => unsigned::<UInt16Type>(column),
        DataType::UInt32 => unsigned::<UInt32Type>(column),
        DataType::UInt64 => unsigned::<UInt64Type>(column),
        DataType::Float16 => float::<Float16Type>(column, |v| v.to_f64()),
        DataType::Float32 => float::<Float32Type>(column, |v| v as f64),
        DataType::Float64 => float::<Float64Type>(column, |v| v),
        DataType::Utf8 => text(column.as_string::<i32>().iter()),
        DataType::LargeUtf8 => text(column.as_string::<i64>().iter()),
        DataType::Utf8View => text(column.as_string_view().iter()),
        _ => {
            let formatter =
                ArrayFormatter::try_new(column, &FormatOptions::default()).context(ArrowSnafu)?;
            (0..column.len())
                .map(|i| {
                    if column.is_null(i) {
                        KeyValue::Null
                    } else {
                        KeyValue::Text(formatter.value(i).to_string())
                    }
                })
                .collect()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::{
        array::{Date32Array, Int32Array, LargeStringArray, StringArray},
        datatypes::{Field, Schema},
    };
    use std::sync::Arc;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn batch() -> RecordBatch {
        let schema = Schema::new(vec![
            Field::new("country", DataType::Utf8, true),
            Field::new("code", DataType::Int32, true),
            Field::new("t", DataType::Date32, false),
        ]);
        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(StringArray::from(vec![Some("b"), Some("a"), None, Some("a"), Some("b")])),
                Arc::new(Int32Array::from(vec![Some(1), Some(2), Some(1), Some(2), None])),
                Arc::new(Date32Array::from(vec![0, 1, 2, 3, 4])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn no_key_columns_is_one_group() -> TestResult {
        let part = partition_by_key(&batch(), &[])?;
        assert_eq!(part.len(), 1);
        assert_eq!(part.get(&KeyTuple::empty()), Some(&[0, 1, 2, 3, 4][..]));
        Ok(())
    }

    #[test]
    fn groups_are_key_ordered_with_ascending_rows() -> TestResult {
        let part = partition_by_key(&batch(), &["country"])?;
        let keys: Vec<String> = part.groups().keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["(NA)", "(a)", "(b)"]);
        assert_eq!(part.get(&KeyTuple::from_iter(["a"])), Some(&[1, 3][..]));
        assert_eq!(part.get(&KeyTuple::from_iter(["b"])), Some(&[0, 4][..]));
        assert_eq!(part.row_count(), 5);
        assert_eq!(part.group_of(3), Some(&KeyTuple::from_iter(["a"])));
        assert_eq!(part.group_of(2), Some(&KeyTuple(vec![KeyValue::Null])));
        assert_eq!(part.group_of(5), None);
        Ok(())
    }

    #[test]
    fn composite_keys() -> TestResult {
        let part = partition_by_key(&batch(), &["country", "code"])?;
        assert_eq!(part.len(), 4);
        let key = KeyTuple(vec![KeyValue::from("b"), KeyValue::Null]);
        assert_eq!(part.get(&key), Some(&[4][..]));
        assert_eq!(part.key_columns(), &["country".to_string(), "code".to_string()]);
        Ok(())
    }

    #[test]
    fn missing_key_column_is_an_error() {
        let err = partition_by_key(&batch(), &["region"]).unwrap_err();
        assert!(matches!(
            err,
            crate::PanelError::InvalidKeyColumn { ref column } if column == "region"
        ));
    }

    #[test]
    fn text_keys_compare_by_value_across_encodings() -> TestResult {
        let small = column_key_values(&StringArray::from(vec!["x"]))?;
        let large = column_key_values(&LargeStringArray::from(vec!["x"]))?;
        assert_eq!(small, large);
        Ok(())
    }

    #[test]
    fn float_keys_normalize_zero_and_nan() {
        assert_eq!(KeyFloat::new(-0.0), KeyFloat::new(0.0));
        assert_eq!(KeyFloat::new(f64::NAN), KeyFloat::new(-f64::NAN));
        assert!(KeyFloat::new(1.0) < KeyFloat::new(2.0));
    }

    #[test]
    fn other_types_fall_back_to_display() -> TestResult {
        let values = column_key_values(&Date32Array::from(vec![Some(0), None]))?;
        assert_eq!(values, vec![KeyValue::from("1970-01-01"), KeyValue::Null]);
        Ok(())
    }
}
