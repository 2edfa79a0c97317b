//! Presence bitmaps over a series' gap grid.
//!
//! A gap grid is the arithmetic sequence `anchor + k·step` for
//! `k = 0..len`. [`GridSpan`] maps canonical index points onto slot ids
//! `k`, and [`Coverage`] records which slots a series actually observes, so
//! missing points are a plain bitmap difference:
//!
//! ```
//! use timeseries_panel_core::coverage::{Coverage, GridSpan};
//!
//! // Slots 0..10; the series observes every slot except 5.
//! let span = GridSpan::new(10).unwrap();
//! let cov: Coverage = (0u32..10).filter(|s| *s != 5).collect();
//!
//! assert_eq!(cov.missing_count(&span), 1);
//! assert_eq!(cov.missing_runs(&span), vec![5..=5]);
//! assert!((cov.coverage_ratio(&span) - 0.9).abs() < 1e-9);
//! ```
//!
//! Counts and runs are derived from the observed slots alone, so they stay
//! cheap on sparse series spanning billions of slots. Only
//! [`Coverage::missing_slots`] builds the full grid.

use std::ops::RangeInclusive;

use roaring::RoaringBitmap;

use crate::error::{GridTooLargeSnafu, Result};

/// Slot id on a gap grid.
pub type Slot = u32;

/// Largest number of slots a single grid may have.
pub const MAX_GRID_POINTS: u64 = Slot::MAX as u64 + 1;

/// The slots `0..len` of one grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSpan {
    len: u64,
}

impl GridSpan {
    /// A grid with `len` slots.
    ///
    /// # Errors
    /// [`PanelError::GridTooLarge`](crate::PanelError::GridTooLarge) if `len`
    /// exceeds [`MAX_GRID_POINTS`].
    pub fn new(len: u64) -> Result<Self> {
        snafu::ensure!(
            len <= MAX_GRID_POINTS,
            GridTooLargeSnafu {
                points: len,
                max: MAX_GRID_POINTS,
            }
        );
        Ok(GridSpan { len })
    }

    /// Number of slots.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the grid has no slots.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Slot id of offset `k`, if it lies on the grid.
    pub fn slot(&self, k: u64) -> Option<Slot> {
        (k < self.len).then_some(k as Slot)
    }

    fn expected(&self) -> RoaringBitmap {
        let mut bitmap = RoaringBitmap::new();
        if self.len > 0 {
            bitmap.insert_range(0..=(self.len - 1) as Slot);
        }
        bitmap
    }
}

/// Slots a series observes on its grid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Coverage {
    bitmap: RoaringBitmap,
}

impl Coverage {
    /// Number of slots of `span` observed.
    pub fn observed(&self, span: &GridSpan) -> u64 {
        match self.bitmap.max() {
            None => 0,
            Some(max) if u64::from(max) < span.len() => self.bitmap.len(),
            Some(_) => self
                .bitmap
                .iter()
                .take_while(|slot| u64::from(*slot) < span.len())
                .count() as u64,
        }
    }

    /// Number of slots of `span` not observed.
    pub fn missing_count(&self, span: &GridSpan) -> u64 {
        span.len() - self.observed(span)
    }

    /// Slots of `span` not observed.
    ///
    /// This builds a bitmap over the whole span; callers materializing gaps
    /// bound [`missing_count`](Self::missing_count) first.
    pub fn missing_slots(&self, span: &GridSpan) -> RoaringBitmap {
        let mut missing = span.expected();
        missing -= &self.bitmap;
        missing
    }

    /// Missing slots grouped into contiguous, inclusive runs.
    pub fn missing_runs(&self, span: &GridSpan) -> Vec<RangeInclusive<u64>> {
        let mut runs = Vec::new();
        // First slot not yet accounted for.
        let mut next = 0u64;
        for slot in self.bitmap.iter().map(u64::from) {
            if slot >= span.len() {
                break;
            }
            if slot > next {
                runs.push(next..=slot - 1);
            }
            next = slot + 1;
        }
        if next < span.len() {
            runs.push(next..=span.len() - 1);
        }
        runs
    }

    /// Share of `span` that is observed, in `[0.0, 1.0]`; an empty span is fully covered.
    pub fn coverage_ratio(&self, span: &GridSpan) -> f64 {
        if span.is_empty() {
            return 1.0;
        }
        self.observed(span) as f64 / span.len() as f64
    }

    /// Length of the longest missing run, 0 when nothing is missing.
    pub fn longest_gap(&self, span: &GridSpan) -> u64 {
        self.missing_runs(span)
            .into_iter()
            .map(|r| r.end() - r.start() + 1)
            .max()
            .unwrap_or(0)
    }
}

impl FromIterator<Slot> for Coverage {
    fn from_iter<I: IntoIterator<Item = Slot>>(iter: I) -> Self {
        Self {
            bitmap: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(len: u64) -> GridSpan {
        GridSpan::new(len).unwrap()
    }

    #[test]
    fn full_coverage_has_no_missing_slots() {
        let cov: Coverage = (0u32..10).collect();
        assert!(cov.missing_slots(&span(10)).is_empty());
        assert!(cov.missing_runs(&span(10)).is_empty());
        assert_eq!(cov.missing_count(&span(10)), 0);
        assert_eq!(cov.longest_gap(&span(10)), 0);
        assert!((cov.coverage_ratio(&span(10)) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn runs_of_missing_slots() {
        let cov: Coverage = (0u32..20)
            .filter(|s| ![3, 4, 10, 11, 12, 18].contains(s))
            .collect();
        let runs = cov.missing_runs(&span(20));
        assert_eq!(runs, vec![3..=4, 10..=12, 18..=18]);
        assert_eq!(cov.longest_gap(&span(20)), 3);
        assert_eq!(cov.missing_count(&span(20)), 6);
        assert_eq!(
            cov.missing_slots(&span(20)).iter().collect::<Vec<_>>(),
            vec![3, 4, 10, 11, 12, 18]
        );
    }

    #[test]
    fn leading_and_trailing_runs() {
        let cov: Coverage = [2u32, 3].into_iter().collect();
        assert_eq!(cov.missing_runs(&span(6)), vec![0..=1, 4..=5]);
    }

    #[test]
    fn slots_beyond_the_span_are_ignored() {
        let cov: Coverage = [0u32, 2, 40].into_iter().collect();
        assert_eq!(cov.missing_runs(&span(3)), vec![1..=1]);
        assert_eq!(cov.observed(&span(3)), 2);
        assert!((cov.coverage_ratio(&span(3)) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn empty_span_and_empty_coverage() {
        let cov = Coverage::default();
        assert!(cov.missing_runs(&span(0)).is_empty());
        assert_eq!(cov.coverage_ratio(&span(0)), 1.0);
        assert_eq!(cov.missing_runs(&span(5)), vec![0..=4]);
        assert_eq!(cov.coverage_ratio(&span(5)), 0.0);
    }

    #[test]
    fn sparse_series_on_a_huge_span() {
        let cov: Coverage = [0u32, Slot::MAX].into_iter().collect();
        let huge = span(MAX_GRID_POINTS);
        assert_eq!(cov.missing_count(&huge), MAX_GRID_POINTS - 2);
        assert_eq!(cov.missing_runs(&huge), vec![1..=(MAX_GRID_POINTS - 2)]);
        assert_eq!(cov.longest_gap(&huge), MAX_GRID_POINTS - 2);
    }

    #[test]
    fn span_slots_and_domain_limit() {
        let s = span(3);
        assert_eq!(s.slot(2), Some(2));
        assert_eq!(s.slot(3), None);
        assert!(GridSpan::new(MAX_GRID_POINTS).is_ok());
        assert!(matches!(
            GridSpan::new(MAX_GRID_POINTS + 1),
            Err(crate::PanelError::GridTooLarge { .. })
        ));
    }
}
