//! Wrapper prelude.
//!
//! The `timeseries-panel` crate is the supported public entry point.
//! Downstream code should prefer importing from this prelude instead of
//! depending on internal core module paths.

pub use crate::{
    Calendar, FillOptions, FillPolicy, FillScope, FillValue, IndexKind, IndexValue, Interval,
    IntervalUnit, KeyTuple, PanelError, PanelSpec, PanelTable,
};
