//! Error types and SNAFU context selectors for panel operations.
//!
//! Every public operation in this crate reports failures through
//! [`PanelError`]. Context selectors are exposed crate-wide (via
//! `#[snafu(visibility(pub(crate)))]`) so the index, key, interval and gap
//! modules can attach context without re-exporting the selectors at the
//! crate root.
//!
//! Two variants are meant to be matched on programmatically:
//! [`PanelError::DuplicateKeyIndex`] (carries every offending tuple) and
//! [`PanelError::CannotInferInterval`] (callers typically retry with an
//! explicit interval override). The remaining variants indicate a wrong
//! column name, parameter or type and should be treated as fatal.

use arrow::{datatypes::DataType, error::ArrowError};
use snafu::prelude::*;

use crate::{index::IndexKind, interval::Interval, validity::DuplicateEntry};

/// Convenience alias used throughout the crate.
pub type Result<T, E = PanelError> = std::result::Result<T, E>;

/// Errors from panel classification, validation, interval inference and gap filling.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PanelError {
    /// The index column's type provides no total temporal order.
    #[snafu(display("Unsupported index type for column {column}: {datatype}"))]
    UnsupportedIndexType {
        /// Name of the index column.
        column: String,
        /// Arrow data type (or declared calendar) that was rejected.
        datatype: String,
    },

    /// The index column contains a null value.
    #[snafu(display("Index column {column} must not contain nulls (first null at row {row})"))]
    MissingIndexValue {
        /// Name of the index column.
        column: String,
        /// Row id of the first null encountered.
        row: usize,
    },

    /// The configured index column does not exist in the table.
    #[snafu(display("Index column {column} not found in table"))]
    InvalidIndexColumn {
        /// The index column name that was not found.
        column: String,
    },

    /// A named key attribute does not exist in the table.
    #[snafu(display("Key column {column} not found in table"))]
    InvalidKeyColumn {
        /// The key column name that was not found.
        column: String,
    },

    /// At least one (key, index) pair occurs more than once.
    #[snafu(display(
        "Found {} duplicated (key, index) pair(s); first: {}",
        violations.len(),
        first_violation(violations)
    ))]
    DuplicateKeyIndex {
        /// Every offending (key, index, rows) triple, in key then index order.
        violations: Vec<DuplicateEntry>,
    },

    /// Gap filling needs a regular step but none is available.
    #[snafu(display(
        "Cannot fill gaps: table interval is {interval} and no regular interval override was supplied"
    ))]
    CannotInferInterval {
        /// The effective (non-regular) interval.
        interval: Interval,
    },

    /// The interval cannot be expressed as a whole step on the index axis.
    #[snafu(display("Interval {interval} is not compatible with a {kind} index"))]
    IncompatibleInterval {
        /// The requested interval.
        interval: Interval,
        /// The index kind it was applied to.
        kind: IndexKind,
    },

    /// The table has zero rows, so no grid can be derived.
    #[snafu(display("Cannot derive a time grid from an empty table"))]
    EmptyTable,

    /// A caller-supplied parameter is out of range.
    #[snafu(display("Invalid parameter: {message}"))]
    InvalidParameter {
        /// Description of the offending parameter.
        message: String,
    },

    /// A fill value cannot be written into a measured column.
    #[snafu(display("Fill value does not fit column {column} of type {datatype}"))]
    FillTypeMismatch {
        /// Name of the measured column.
        column: String,
        /// Arrow data type of that column.
        datatype: DataType,
    },

    /// A gap grid would exceed the `u32` bitmap domain.
    #[snafu(display("Gap grid with {points} points exceeds the supported domain (max {max})"))]
    GridTooLarge {
        /// Number of grid points requested.
        points: u64,
        /// Maximum supported number of grid points.
        max: u64,
    },

    /// Too many missing points to materialize as values or rows in one call.
    #[snafu(display(
        "Refusing to materialize {missing} missing points (max {max}); narrow the scope or coarsen the interval"
    ))]
    TooManyGaps {
        /// Number of missing points across all groups.
        missing: u64,
        /// Largest number materialized at once.
        max: u64,
    },

    /// Arrow compute or construction error while assembling a table.
    #[snafu(display("Arrow error: {source}"))]
    Arrow {
        /// Underlying Arrow error.
        source: ArrowError,
    },
}

impl PanelError {
    /// Duplicate entries carried by [`PanelError::DuplicateKeyIndex`], if any.
    pub fn violations(&self) -> Option<&[DuplicateEntry]> {
        match self {
            PanelError::DuplicateKeyIndex { violations } => Some(violations),
            _ => None,
        }
    }
}

fn first_violation(violations: &[DuplicateEntry]) -> String {
    violations
        .first()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "<none>".to_string())
}
