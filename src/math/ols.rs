//! Linear least squares solver.
//!
//! Two places in the fitter solve small, tall linear systems:
//!
//! ```text
//! minimize ‖A x - b‖²
//! ```
//!
//! - the sideband regression that seeds the background polynomial
//! - every damped Levenberg–Marquardt step, written as the augmented system
//!   `[J; √λ·D] δ = [r; 0]`
//!
//! Implementation choices:
//! - SVD handles tall (more rows than columns) systems and rank deficiency.
//!   A flat spectrum leaves the peak shape unconstrained, so rank deficiency is
//!   a normal case here, not an error.
//! - Nalgebra's `QR::solve` is intended for square systems and panics on tall ones.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = a.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(x) = svd.solve(b, tol) {
            if x.iter().all(|v| v.is_finite()) {
                return Some(x);
            }
        }
    }

    None
}

/// Invert a symmetric normal matrix (`JᵀJ`), returning `None` when singular.
pub fn invert_normal_matrix(m: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let inv = m.clone().try_inverse()?;
    if inv.iter().all(|v| v.is_finite()) {
        Some(inv)
    } else {
        None
    }
}
