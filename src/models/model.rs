//! Model evaluation for the fit catalog.
//!
//! The fitter relies on two primitive operations:
//! - fill a Jacobian row `∂f/∂p` at a given mass (for each LM step)
//! - predict `f(x)` given parameters (for residuals, integrals and plots)
//!
//! Parameter layout is `[amplitude, mean, width, background...]`, matching
//! `FitFunction::param_names`. Backgrounds are written in `u = x - pivot` where
//! the pivot is the expected peak position; this keeps the polynomial columns
//! well conditioned.

use crate::domain::FitFunction;
use crate::math::{breit_wigner, breit_wigner_grad, gaussian, gaussian_grad};

/// Signal component only.
pub fn signal(model: FitFunction, x: f64, params: &[f64]) -> f64 {
    match model {
        FitFunction::GaussianPlusLinear
        | FitFunction::GaussianPlusQuadratic
        | FitFunction::GaussianPlusExponential => params[0] * gaussian(x, params[1], params[2]),
        FitFunction::BreitWignerPlusLinear => params[0] * breit_wigner(x, params[1], params[2]),
    }
}

/// Background component only.
pub fn background(model: FitFunction, x: f64, params: &[f64], pivot: f64) -> f64 {
    let u = x - pivot;
    match model {
        FitFunction::GaussianPlusLinear | FitFunction::BreitWignerPlusLinear => {
            params[3] + params[4] * u
        }
        FitFunction::GaussianPlusQuadratic => params[3] + params[4] * u + params[5] * u * u,
        FitFunction::GaussianPlusExponential => params[3] * (params[4] * u).exp(),
    }
}

/// Predict the total model `f(x)`.
pub fn predict(model: FitFunction, x: f64, params: &[f64], pivot: f64) -> f64 {
    signal(model, x, params) + background(model, x, params, pivot)
}

/// Fill `out` with `∂f/∂p_j` at `x`.
///
/// # Panics
/// Panics if `params` or `out` is shorter than `model.param_len()`.
pub fn fill_jacobian_row(model: FitFunction, x: f64, params: &[f64], pivot: f64, out: &mut [f64]) {
    let u = x - pivot;
    let (amp, mean, width) = (params[0], params[1], params[2]);

    match model {
        FitFunction::GaussianPlusLinear
        | FitFunction::GaussianPlusQuadratic
        | FitFunction::GaussianPlusExponential => {
            let g = gaussian(x, mean, width);
            let (dm, ds) = gaussian_grad(x, mean, width, g);
            out[0] = g;
            out[1] = amp * dm;
            out[2] = amp * ds;
        }
        FitFunction::BreitWignerPlusLinear => {
            let (dm, dg) = breit_wigner_grad(x, mean, width);
            out[0] = breit_wigner(x, mean, width);
            out[1] = amp * dm;
            out[2] = amp * dg;
        }
    }

    match model {
        FitFunction::GaussianPlusLinear | FitFunction::BreitWignerPlusLinear => {
            out[3] = 1.0;
            out[4] = u;
        }
        FitFunction::GaussianPlusQuadratic => {
            out[3] = 1.0;
            out[4] = u;
            out[5] = u * u;
        }
        FitFunction::GaussianPlusExponential => {
            let e = (params[4] * u).exp();
            out[3] = e;
            out[4] = params[3] * u * e;
        }
    }
}
