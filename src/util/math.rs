//! Numeric helpers shared by the overlap and codec kernels.

/// Divides `num` by `den`, returning 0 when `den` is not strictly positive.
///
/// Zero-area boxes must yield an overlap of 0 rather than NaN or Inf.
#[inline]
pub(crate) fn guarded_div(num: f32, den: f32) -> f32 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

/// Integer ceil division for positive divisors.
#[inline]
pub(crate) fn ceil_div(num: u32, den: u32) -> u32 {
    debug_assert!(den > 0);
    num / den + u32::from(num % den != 0)
}

/// Product of `dims`, or `None` when it does not fit in `usize`.
#[inline]
pub(crate) fn checked_volume(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

/// Returns true if every value is finite and strictly positive.
pub(crate) fn all_finite_positive(values: &[f32]) -> bool {
    values.iter().all(|v| v.is_finite() && *v > 0.0)
}
