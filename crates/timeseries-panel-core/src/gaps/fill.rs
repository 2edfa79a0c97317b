//! Materializing gaps as rows.

use std::sync::Arc;

use arrow::{
    array::{
        ArrayRef, BooleanArray, LargeStringArray, PrimitiveArray, RecordBatch,
        StringArray, UInt32Array, new_null_array,
    },
    compute::{concat, take},
    datatypes::{
        ArrowPrimitiveType, DataType, Field, Float32Type, Float64Type, Int8Type, Int16Type,
        Int32Type, Int64Type, Schema, UInt8Type, UInt16Type, UInt32Type, UInt64Type,
    },
};
use snafu::prelude::*;

use super::{
    FillContext, FillOptions, FillPolicy, FillValue, GroupGrid, effective_step,
    ensure_materializable, group_grids, total_missing,
};
use crate::{
    error::{ArrowSnafu, FillTypeMismatchSnafu, InvalidParameterSnafu, PanelError, Result},
    index::{IndexValue, axis::AxisPoint, with_projected},
    key::KeyTuple,
    table::PanelTable,
};

/// Insert a row for every gap of every group.
///
/// Synthesized rows copy the key columns from the group's first row, carry
/// the missing index point in the index column's own Arrow type, and fill
/// measured columns according to [`FillOptions::policy`]. The result is
/// sorted by key and then index; measured fields become nullable.
///
/// Filling an already filled table with the same options inserts nothing.
///
/// # Errors
/// - [`PanelError::EmptyTable`] for a table without rows.
/// - [`PanelError::CannotInferInterval`] when no regular step is available.
/// - [`PanelError::IncompatibleInterval`] when the override does not fit the axis.
/// - [`PanelError::FillTypeMismatch`] when a fill value does not fit its column.
/// - [`PanelError::GridTooLarge`] when a group's grid exceeds the bitmap domain.
/// - [`PanelError::TooManyGaps`] when more than
///   [`MAX_MATERIALIZED_GAPS`](super::MAX_MATERIALIZED_GAPS) rows would be inserted.
pub fn fill_gaps(table: &PanelTable, options: &FillOptions) -> Result<PanelTable> {
    let batch = with_projected!(table.projection(), values => {
        fill_batch(table, values.as_slice(), options)?
    });
    PanelTable::try_new(batch, table.spec().clone())
}

/// Synthesized rows of one group: where they come from and where they sit.
struct Insertions<P> {
    key: KeyTuple,
    template_row: usize,
    points: Vec<P>,
}

fn fill_batch<P: AxisPoint>(
    table: &PanelTable,
    values: &[P],
    options: &FillOptions,
) -> Result<RecordBatch> {
    let step: P = effective_step(table, options.interval)?;
    let grids = group_grids(table, values, step, options.scope)?;
    ensure_materializable(total_missing(&grids))?;

    let insertions: Vec<Insertions<P>> = grids
        .iter()
        .filter_map(|grid: &GroupGrid<'_, P>| {
            let points = grid.missing_points();
            let template_row = *grid.rows.first()?;
            (!points.is_empty()).then(|| Insertions {
                key: grid.key.clone(),
                template_row,
                points,
            })
        })
        .collect();

    let inserted: usize = insertions.iter().map(|i| i.points.len()).sum();
    let batch = table.batch();
    if inserted == 0 {
        log::debug!("no gaps to fill in {} groups", grids.len());
        return Ok(batch.clone());
    }
    log::debug!(
        "filling {inserted} gaps across {} of {} groups at step {:?}",
        insertions.len(),
        grids.len(),
        step
    );

    let kind = table.index_kind();
    let index_column = table.spec().index_column.as_str();
    let key_columns = &table.spec().key_columns;

    // Template rows for key columns, one per synthesized row.
    let template = UInt32Array::from(
        insertions
            .iter()
            .flat_map(|ins| std::iter::repeat_n(ins.template_row, ins.points.len()))
            .map(|row| {
                u32::try_from(row).map_err(|_| PanelError::InvalidParameter {
                    message: format!("row id {row} exceeds the u32 take domain"),
                })
            })
            .collect::<Result<Vec<_>>>()?,
    );

    let new_points: Vec<P> = insertions
        .iter()
        .flat_map(|ins| ins.points.iter().copied())
        .collect();
    let new_index = P::materialize(kind, table.projection().data_type(), &new_points)?;

    // (key, index) of each synthesized row, for computed fills.
    let contexts: Vec<(&KeyTuple, IndexValue)> = insertions
        .iter()
        .flat_map(|ins| ins.points.iter().map(|p| (&ins.key, p.index_value(kind))))
        .collect();

    let schema = batch.schema();
    let mut fields: Vec<Field> = Vec::with_capacity(schema.fields().len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());

    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        let name = field.name().as_str();
        let synthesized: ArrayRef = if name == index_column {
            new_index.clone()
        } else if key_columns.iter().any(|k| k == name) {
            take(column.as_ref(), &template, None).context(ArrowSnafu)?
        } else {
            measure_values(name, field.data_type(), &options.policy, &contexts)?
        };

        let is_measure = name != index_column && !key_columns.iter().any(|k| k == name);
        let field = if is_measure {
            field.as_ref().clone().with_nullable(true)
        } else {
            field.as_ref().clone()
        };

        columns.push(concat(&[column.as_ref(), synthesized.as_ref()]).context(ArrowSnafu)?);
        fields.push(field);
    }

    // Stable order by (key, index): original rows before synthesized ones on ties.
    let original_rows = batch.num_rows();
    let mut order: Vec<u32> = Vec::with_capacity(original_rows + inserted);
    let mut next_new = original_rows;
    let mut pending = insertions.iter().peekable();
    for (key, rows) in table.partition().groups() {
        let mut entries: Vec<(P, usize)> = rows.iter().map(|r| (values[*r], *r)).collect();
        if let Some(ins) = pending.next_if(|ins| &ins.key == key) {
            for p in &ins.points {
                entries.push((*p, next_new));
                next_new += 1;
            }
        }
        entries.sort_by(|a, b| a.0.axis_cmp(&b.0).then(a.1.cmp(&b.1)));
        order.extend(entries.into_iter().map(|(_, row)| row as u32));
    }
    ensure!(
        order.len() == original_rows + inserted,
        InvalidParameterSnafu {
            message: "synthesized rows do not match any key group".to_string(),
        }
    );

    let order = UInt32Array::from(order);
    let columns = columns
        .iter()
        .map(|c| take(c.as_ref(), &order, None))
        .collect::<std::result::Result<Vec<_>, _>>()
        .context(ArrowSnafu)?;

    let schema = Schema::new_with_metadata(fields, schema.metadata().clone());
    RecordBatch::try_new(Arc::new(schema), columns).context(ArrowSnafu)
}

/// Values of one measured column for every synthesized row.
fn measure_values(
    column: &str,
    data_type: &DataType,
    policy: &FillPolicy,
    contexts: &[(&KeyTuple, IndexValue)],
) -> Result<ArrayRef> {
    let n = contexts.len();
    match policy {
        FillPolicy::NoFill => Ok(new_null_array(data_type, n)),
        FillPolicy::Value(value) => constant_array(column, data_type, value, n),
        FillPolicy::PerColumn(values) => match values.get(column) {
            Some(value) => constant_array(column, data_type, value, n),
            None => Ok(new_null_array(data_type, n)),
        },
        FillPolicy::Function(f) => {
            let computed: Vec<FillValue> = contexts
                .iter()
                .map(|(key, index)| f(&FillContext { key: *key, index, column }))
                .collect();
            values_array(column, data_type, &computed)
        }
    }
}

fn constant_array(column: &str, data_type: &DataType, value: &FillValue, n: usize) -> Result<ArrayRef> {
    if matches!(value, FillValue::Missing) {
        return Ok(new_null_array(data_type, n));
    }
    values_array(column, data_type, &vec![value.clone(); n])
}

/// Build an array of `data_type` from fill values.
pub(crate) fn values_array(column: &str, data_type: &DataType, values: &[FillValue]) -> Result<ArrayRef> {
    let mismatch = || {
        FillTypeMismatchSnafu {
            column: column.to_string(),
            datatype: data_type.clone(),
        }
        .build()
    };

    fn primitive<T: ArrowPrimitiveType>(
        values: &[FillValue],
        convert: impl Fn(&FillValue) -> Option<T::Native>,
        mismatch: impl Fn() -> PanelError,
    ) -> Result<ArrayRef> {
        let converted = values
            .iter()
            .map(|v| match v {
                FillValue::Missing => Ok(None),
                other => convert(other).map(Some).ok_or_else(&mismatch),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Arc::new(PrimitiveArray::<T>::from_iter(converted)))
    }

    match data_type {
        DataType::Int8 => primitive::<Int8Type>(values, |v| v.as_i64().and_then(|i| i.try_into().ok()), mismatch),
        DataType::Int16 => primitive::<Int16Type>(values, |v| v.as_i64().and_then(|i| i.try_into().ok()), mismatch),
        DataType::Int32 => primitive::<Int32Type>(values, |v| v.as_i64().and_then(|i| i.try_into().ok()), mismatch),
        DataType::Int64 => primitive::<Int64Type>(values, FillValue::as_i64, mismatch),
        DataType::UInt8 => primitive::<UInt8Type>(values, |v| v.as_u64().and_then(|i| i.try_into().ok()), mismatch),
        DataType::UInt16 => primitive::<UInt16Type>(values, |v| v.as_u64().and_then(|i| i.try_into().ok()), mismatch),
        DataType::UInt32 => primitive::<UInt32Type>(values, |v| v.as_u64().and_then(|i| i.try_into().ok()), mismatch),
        DataType::UInt64 => primitive::<UInt64Type>(values, FillValue::as_u64, mismatch),
        DataType::Float32 => primitive::<Float32Type>(values, |v| v.as_f64().map(|f| f as f32), mismatch),
        DataType::Float64 => primitive::<Float64Type>(values, FillValue::as_f64, mismatch),
        DataType::Boolean => {
            let converted = values
                .iter()
                .map(|v| match v {
                    FillValue::Missing => Ok(None),
                    FillValue::Boolean(b) => Ok(Some(*b)),
                    _ => Err(mismatch()),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Arc::new(BooleanArray::from(converted)))
        }
        DataType::Utf8 | DataType::LargeUtf8 => {
            let converted = values
                .iter()
                .map(|v| match v {
                    FillValue::Missing => Ok(None),
                    FillValue::Text(s) => Ok(Some(s.as_str())),
                    _ => Err(mismatch()),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(if matches!(data_type, DataType::Utf8) {
                Arc::new(StringArray::from(converted))
            } else {
                Arc::new(LargeStringArray::from(converted))
            })
        }
        other if values.iter().all(|v| matches!(v, FillValue::Missing)) => {
            Ok(new_null_array(other, values.len()))
        }
        _ => Err(mismatch()),
    }
}
