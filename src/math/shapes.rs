//! Peak kernels used by the fit catalog.
//!
//! Both kernels are unnormalized (peak value 1 at `x = mean`) so the fitted
//! amplitude reads directly as the peak height in entries per bin.
//!
//! Numerical notes:
//! - The Gaussian is evaluated as `exp(-z²/2)` with `z = (x - mean) / sigma`;
//!   only `sigma²` enters, so a negative `sigma` during minimization is harmless.
//! - The Breit-Wigner uses the half width `h = Γ/2` and is finite for any
//!   non-zero `Γ`.

/// `exp(-½ ((x - mean) / sigma)²)`.
pub fn gaussian(x: f64, mean: f64, sigma: f64) -> f64 {
    let d = x - mean;
    (-0.5 * d * d / (sigma * sigma)).exp()
}

/// Partial derivatives of `gaussian` w.r.t. `(mean, sigma)`, given its value `g`.
pub fn gaussian_grad(x: f64, mean: f64, sigma: f64, g: f64) -> (f64, f64) {
    let d = x - mean;
    let s2 = sigma * sigma;
    (g * d / s2, g * d * d / (s2 * sigma))
}

/// `h² / ((x - mean)² + h²)` with `h = gamma / 2`.
pub fn breit_wigner(x: f64, mean: f64, gamma: f64) -> f64 {
    let d = x - mean;
    let h = 0.5 * gamma;
    let h2 = h * h;
    h2 / (d * d + h2)
}

/// Partial derivatives of `breit_wigner` w.r.t. `(mean, gamma)`.
pub fn breit_wigner_grad(x: f64, mean: f64, gamma: f64) -> (f64, f64) {
    let d = x - mean;
    let h = 0.5 * gamma;
    let h2 = h * h;
    let den = d * d + h2;
    let den2 = den * den;
    (2.0 * h2 * d / den2, h * d * d / den2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(f: impl Fn(f64) -> f64, p: f64) -> f64 {
        let eps = 1e-6;
        (f(p + eps) - f(p - eps)) / (2.0 * eps)
    }

    #[test]
    fn kernels_peak_at_mean() {
        assert!((gaussian(91.0, 91.0, 2.5) - 1.0).abs() < 1e-15);
        assert!((breit_wigner(91.0, 91.0, 2.5) - 1.0).abs() < 1e-15);
        assert!((breit_wigner(91.0 + 1.25, 91.0, 2.5) - 0.5).abs() < 1e-12);
        assert!((gaussian(93.5, 91.0, 2.5) - (-0.5f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn gaussian_gradient_matches_finite_differences() {
        let (x, mean, sigma) = (89.3, 91.0, 2.2);
        let g = gaussian(x, mean, sigma);
        let (dm, ds) = gaussian_grad(x, mean, sigma, g);
        assert!((dm - numeric(|m| gaussian(x, m, sigma), mean)).abs() < 1e-7);
        assert!((ds - numeric(|s| gaussian(x, mean, s), sigma)).abs() < 1e-7);
    }

    #[test]
    fn breit_wigner_gradient_matches_finite_differences() {
        let (x, mean, gamma) = (93.1, 91.0, 2.5);
        let (dm, dg) = breit_wigner_grad(x, mean, gamma);
        assert!((dm - numeric(|m| breit_wigner(x, m, gamma), mean)).abs() < 1e-7);
        assert!((dg - numeric(|g| breit_wigner(x, mean, g), gamma)).abs() < 1e-7);
    }
}
