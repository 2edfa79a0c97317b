//! Greatest common divisors on exact and approximate axes.

/// Residual (in units of the candidate divisor) under which a difference
/// counts as a whole multiple on an approximate axis.
pub const GCD_TOLERANCE: f64 = 1e-5;

/// Largest `k` tried when searching `min_delta / k` for an approximate divisor.
pub const MAX_SUBDIVISIONS: u32 = 1_000;

/// Euclid's gcd over the absolute values of the non-zero inputs.
///
/// Returns `None` when there is no non-zero input.
pub fn exact_gcd(values: impl IntoIterator<Item = i64>) -> Option<i64> {
    values
        .into_iter()
        .filter(|v| *v != 0)
        .map(|v| v.unsigned_abs())
        .reduce(gcd_u64)
        .and_then(|g| i64::try_from(g).ok())
}

fn gcd_u64(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Largest `d` such that every input is (within [`GCD_TOLERANCE`]) a whole
/// multiple of `d`.
///
/// Candidates are `min / k` for `k = 1..=MAX_SUBDIVISIONS`, where `min` is the
/// smallest positive input; the first candidate that divides every input is
/// returned. Returns `None` when there is no positive input or when no
/// candidate fits, which callers report as an irregular interval.
pub fn approx_gcd(values: &[f64]) -> Option<f64> {
    let positive: Vec<f64> = values
        .iter()
        .map(|v| v.abs())
        .filter(|v| v.is_finite() && *v > 0.0)
        .collect();
    let min = positive.iter().copied().reduce(f64::min)?;

    (1..=MAX_SUBDIVISIONS)
        .map(|k| min / k as f64)
        .find(|candidate| positive.iter().all(|v| is_multiple(*v, *candidate)))
}

/// Whether `value` is a whole multiple of `step` within [`GCD_TOLERANCE`].
pub(crate) fn is_multiple(value: f64, step: f64) -> bool {
    let ratio = value / step;
    (ratio - ratio.round()).abs() <= GCD_TOLERANCE
}
