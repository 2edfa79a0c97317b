//! # timeseries-panel
//!
//! Tidy keyed time-series panels over Arrow record batches: interval
//! inference, duplicate checks, gap filling and order-aware differences.
//!
//! This crate is the supported public entry point and provides a small, stable surface.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use arrow::array::{Int64Array, RecordBatch, StringArray};
//! use arrow::datatypes::{DataType, Field, Schema};
//! use timeseries_panel::prelude::*;
//!
//! let schema = Schema::new(vec![
//!     Field::new("k", DataType::Utf8, false),
//!     Field::new("year", DataType::Int64, false),
//! ]);
//! let batch = RecordBatch::try_new(
//!     Arc::new(schema),
//!     vec![
//!         Arc::new(StringArray::from(vec!["a", "a", "b"])),
//!         Arc::new(Int64Array::from(vec![2000, 2002, 2001])),
//!     ],
//! )
//! .unwrap();
//!
//! let table = PanelTable::try_new(batch, PanelSpec::new("year").with_keys(["k"])).unwrap();
//! assert_eq!(table.interval().to_string(), "1Y");
//!
//! let filled = table.fill_gaps(&FillOptions::default()).unwrap();
//! assert_eq!(filled.num_rows(), 4);
//! ```

/// Convenience prelude with the stable, supported surface.
pub mod prelude;

/// Grid coverage bitmaps used by gap detection.
pub mod coverage {
    pub use timeseries_panel_core::coverage::{Coverage, GridSpan, MAX_GRID_POINTS};
}

pub use timeseries_panel_core::{
    Calendar, Difference, DuplicateEntry, FillContext, FillFn, FillOptions, FillPolicy, FillScope,
    FillValue, GapRun, GapSummary, IndexKind, IndexValue, Interval, IntervalUnit, KeyTuple, KeyValue,
    MAX_MATERIALIZED_GAPS, Magnitude, OrderKind, PanelError, PanelSpec, PanelTable, ParseIntervalError, Partition,
    Result, check_validity, classify_index, difference, infer_interval, partition_by_key,
};
