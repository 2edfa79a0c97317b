//! Lagged differences, optionally taken along an explicit ordering.
//!
//! `difference(x, lag, d)` applies the first-difference operator
//! `y[i] = x[i] - x[i - lag]` `d` times. The first `lag · d` positions have
//! no defined value and are padded with the fill value (null by default).
//! Missing inputs propagate: a difference involving a null is null.
//!
//! With an ordering, values are stably sorted by it, differenced, and
//! scattered back, so the output lines up with the caller's row order.

use snafu::prelude::*;

use crate::error::{InvalidParameterSnafu, Result};

/// A configured difference operator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Difference {
    lag: usize,
    differences: usize,
    fill: Option<f64>,
}

impl Difference {
    /// Operator with the given lag and order of differencing.
    ///
    /// # Errors
    /// [`PanelError::InvalidParameter`](crate::PanelError::InvalidParameter)
    /// if `lag` or `differences` is zero.
    pub fn new(lag: usize, differences: usize) -> Result<Self> {
        ensure!(
            lag >= 1,
            InvalidParameterSnafu {
                message: format!("lag must be >= 1 (got {lag})"),
            }
        );
        ensure!(
            differences >= 1,
            InvalidParameterSnafu {
                message: format!("differences must be >= 1 (got {differences})"),
            }
        );
        Ok(Difference {
            lag,
            differences,
            fill: None,
        })
    }

    /// Pad the undefined leading positions with `fill` instead of null.
    pub fn with_fill(mut self, fill: Option<f64>) -> Self {
        self.fill = fill;
        self
    }

    /// Number of padded leading positions.
    pub fn padding(&self) -> usize {
        self.lag.saturating_mul(self.differences)
    }

    /// Difference `x` in its given order.
    pub fn apply(&self, x: &[Option<f64>]) -> Vec<Option<f64>> {
        let mut current = x.to_vec();
        for _ in 0..self.differences {
            let mut next = vec![None; current.len()];
            for i in self.lag..current.len() {
                next[i] = match (current[i], current[i - self.lag]) {
                    (Some(a), Some(b)) => Some(a - b),
                    _ => None,
                };
            }
            current = next;
        }

        let padding = self.padding().min(current.len());
        for slot in &mut current[..padding] {
            *slot = self.fill;
        }
        current
    }

    /// Difference `x` along the order of `order_by`, returning values in the
    /// original positions.
    ///
    /// # Errors
    /// [`PanelError::InvalidParameter`](crate::PanelError::InvalidParameter)
    /// if `order_by` and `x` differ in length.
    pub fn apply_ordered<O: Ord>(&self, x: &[Option<f64>], order_by: &[O]) -> Result<Vec<Option<f64>>> {
        ensure!(
            order_by.len() == x.len(),
            InvalidParameterSnafu {
                message: format!(
                    "order_by has {} entries but the input has {}",
                    order_by.len(),
                    x.len()
                ),
            }
        );
        let mut order: Vec<usize> = (0..x.len()).collect();
        order.sort_by(|a, b| order_by[*a].cmp(&order_by[*b]));
        Ok(self.apply_permuted(x, &order))
    }

    /// Difference `x` visiting positions in `order`, scattering results back.
    pub(crate) fn apply_permuted(&self, x: &[Option<f64>], order: &[usize]) -> Vec<Option<f64>> {
        let sorted: Vec<Option<f64>> = order.iter().map(|i| x[*i]).collect();
        let diffed = self.apply(&sorted);
        let mut out = vec![None; x.len()];
        for (pos, value) in order.iter().zip(diffed) {
            out[*pos] = value;
        }
        out
    }
}

/// Lagged differences of `x`; see the module documentation.
///
/// # Errors
/// [`PanelError::InvalidParameter`](crate::PanelError::InvalidParameter) if
/// `lag < 1`, `differences < 1`, or `order_by` has the wrong length.
pub fn difference(
    x: &[Option<f64>],
    lag: usize,
    differences: usize,
    fill: Option<f64>,
    order_by: Option<&[i64]>,
) -> Result<Vec<Option<f64>>> {
    let op = Difference::new(lag, differences)?.with_fill(fill);
    match order_by {
        Some(order_by) => op.apply_ordered(x, order_by),
        None => Ok(op.apply(x)),
    }
}
