//! Core engine for tidy panel time-series tables.
//!
//! A panel table is an Arrow [`RecordBatch`](arrow::array::RecordBatch) with
//! one *index* column (dates, timestamps, integers, decimals or calendar
//! periods) and zero or more *key* columns identifying independent series.
//! This crate provides:
//!
//! - Index classification onto a canonical, totally ordered axis (`index`
//!   module), including year-week, year-month and year-quarter calendars.
//! - Key partitioning of rows into groups (`key` module).
//! - Interval inference from the GCD of index steps, exact for integer-backed
//!   axes and tolerance-based for decimals (`interval` module).
//! - Duplicate (key, index) detection (`validity` module).
//! - Gap detection and filling with several scopes and fill policies (`gaps`
//!   module), backed by RoaringBitmap grid coverage (`coverage` module).
//! - Order-aware lagged differences (`difference` module).
//!
//! [`PanelTable`] ties these together: it validates a batch once, caches the
//! inferred interval, and exposes the gap and difference operations.
//! Higher-level crates (the CLI, the facade crate) depend on this crate
//! rather than re-implementing the algorithms.
#![deny(missing_docs)]
pub mod coverage;
pub mod difference;
pub mod error;
pub mod gaps;
pub mod index;
pub mod interval;
pub mod key;
pub mod table;
pub mod validity;

pub use difference::{Difference, difference};
pub use error::{PanelError, Result};
pub use gaps::{
    FillContext, FillFn, FillOptions, FillPolicy, FillScope, FillValue, GapRun, GapSummary,
    MAX_MATERIALIZED_GAPS, count_gaps, fill_gaps, has_gaps, new_data, scan_gaps, summarize_gaps,
};
pub use index::{Calendar, IndexKind, IndexProjection, IndexValue, OrderKind, classify_index};
pub use interval::{
    Interval, IntervalUnit, Magnitude, ParseIntervalError, infer_group_intervals, infer_interval,
    table_interval,
};
pub use key::{KeyTuple, KeyValue, Partition, partition_by_key};
pub use table::{PanelSpec, PanelTable};
pub use validity::{DuplicateEntry, check_validity, duplicated_rows, find_duplicates};
