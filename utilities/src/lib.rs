/// Computes n! in floating point so that high degree normalizations do not overflow an integer.
///
/// Degrees beyond 170 overflow f64 and return infinity.
pub fn factorial(n: u32) -> f64 {
    (1..=n).fold(1.0, |acc, k| acc * k as f64)
}

/// Ratio (n - m)! / (n + m)! evaluated as a running product.
///
/// Used by gravity normalizations where both factorials alone overflow long
/// before their ratio underflows.
pub fn factorial_ratio(n: u32, m: u32) -> f64 {
    let mut ratio = 1.0;
    for k in (n - m + 1)..=(n + m) {
        ratio /= k as f64;
    }
    ratio
}

pub fn assert_equal(left: f64, right: f64) {
    assert_equal_reltol(left, right, 1e-9);
}

pub fn assert_equal_reltol(left: f64, right: f64, reltol: f64) {
    let max = left.abs().max(right.abs());
    if max < f64::EPSILON {
        // If both values are close to zero, we consider them equal
        return;
    }
    let abs_diff = (left - right).abs();
    let rel_diff = abs_diff / max;

    assert!(
        rel_diff < reltol,
        "Assertion failed: left ({}) and right ({}) are not approximately equal. Relative difference: {}. Absolute difference: {}",
        left,
        right,
        rel_diff,
        abs_diff,
    );
}

/// Element-wise `assert_equal_reltol` for two slices of the same length.
pub fn assert_slice_equal_reltol(left: &[f64], right: &[f64], reltol: f64) {
    assert_eq!(
        left.len(),
        right.len(),
        "Assertion failed: slices have different lengths ({} vs {})",
        left.len(),
        right.len()
    );
    for (l, r) in left.iter().zip(right) {
        assert_equal_reltol(*l, *r, reltol);
    }
}
