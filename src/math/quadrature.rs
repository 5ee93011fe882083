//! Quadrature helpers for transit-time densities.
//!
//! Numerical notes:
//! - `1 - exp(-x)` suffers from catastrophic cancellation for small `x`; use
//!   [`one_minus_exp_neg`] (an `expm1` form) instead.
//! - Densities without a closed-form CDF are integrated per axis bin with
//!   composite Simpson quadrature.

/// Compute `1 - exp(-x)` without cancellation.
pub fn one_minus_exp_neg(x: f64) -> f64 {
    -(-x).exp_m1()
}

/// Composite Simpson rule over `[a, b]` with `intervals` sub-intervals.
///
/// `intervals` is rounded up to the next even number (minimum 2).
pub fn simpson<F>(f: F, a: f64, b: f64, intervals: usize) -> f64
where
    F: Fn(f64) -> f64,
{
    if b <= a {
        return 0.0;
    }
    let n = intervals.max(2).next_multiple_of(2);
    let h = (b - a) / n as f64;

    let mut sum = f(a) + f(b);
    for i in 1..n {
        let x = a + h * i as f64;
        let w = if i % 2 == 1 { 4.0 } else { 2.0 };
        sum += w * f(x);
    }
    sum * h / 3.0
}
