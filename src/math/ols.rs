//! Linear least squares kernels used by the calibration solver.
//!
//! Each Levenberg–Marquardt iteration solves a small damped linear problem:
//!
//! ```text
//! minimize ‖J δ + r‖² + λ ‖D δ‖²
//! ```
//!
//! We stack `J` on top of `√λ·D` and solve the resulting tall system as an
//! ordinary least squares problem. SVD is used because `J` can be close to
//! rank deficient (e.g. a piston fraction that barely affects the output).
//! Parameter dimension is tiny, so the cost is negligible next to the model
//! evaluations.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Solve the damped step `[J; √λ·D] δ = [-r; 0]`.
///
/// `scale` holds the diagonal of `D`.
pub fn damped_step(
    jacobian: &DMatrix<f64>,
    residuals: &DVector<f64>,
    lambda: f64,
    scale: &[f64],
) -> Option<DVector<f64>> {
    let m = jacobian.nrows();
    let p = jacobian.ncols();

    let mut a = DMatrix::<f64>::zeros(m + p, p);
    let mut b = DVector::<f64>::zeros(m + p);
    a.rows_mut(0, m).copy_from(jacobian);
    for i in 0..m {
        b[i] = -residuals[i];
    }
    let sl = lambda.max(0.0).sqrt();
    for j in 0..p {
        a[(m + j, j)] = sl * scale[j];
    }

    solve_least_squares(&a, &b)
}

/// Moore–Penrose pseudo-inverse of `JᵀJ`, the unscaled parameter covariance.
pub fn normal_pseudo_inverse(jacobian: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let jtj = jacobian.transpose() * jacobian;
    let max_diag = jtj.diagonal().iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if !(max_diag.is_finite() && max_diag > 0.0) {
        return None;
    }
    let cov = jtj.svd(true, true).pseudo_inverse(max_diag * 1e-12).ok()?;
    if cov.iter().all(|v| v.is_finite()) {
        Some(cov)
    } else {
        None
    }
}
