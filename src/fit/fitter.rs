//! Spectrum fitting for a single mass histogram slice.
//!
//! Given:
//! - bin centers `x_i` and contents `n_i` inside the fit range
//! - a catalog shape `f(x; p)`
//! - seeds from the parameter bundle
//!
//! we minimize the Neyman χ²
//!
//! ```text
//! χ²(p) = Σ ((n_i - f(x_i; p)) / σ_i)²,   σ_i = sqrt(max(n_i, 1))
//! ```
//!
//! with Levenberg–Marquardt. Every damped step is the linear least squares
//! problem `[J; √λ·D] δ = [r; 0]` (`D` = column scales of `J`), solved with the
//! same SVD routine used for the background seed.

use nalgebra::{DMatrix, DVector};

use crate::domain::{Axis, FitFunction, FitSummary, NamedParam, ParameterBundle};
use crate::error::TnpError;
use crate::math::{SIMPSON_PANELS, invert_normal_matrix, simpson, solve_least_squares};
use crate::models::{background, fill_jacobian_row, predict, signal};

/// Minimizer settings.
#[derive(Debug, Clone)]
pub struct FitOptions {
    pub max_iterations: usize,
    /// Relative χ² decrease below which an accepted step counts as converged.
    pub tolerance: f64,
    pub lambda_initial: f64,
    /// Damping beyond which no downhill step exists (local minimum reached).
    pub lambda_max: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-9,
            lambda_initial: 1e-3,
            lambda_max: 1e12,
        }
    }
}

/// Converged fit of one spectrum.
#[derive(Debug, Clone)]
pub struct SpectrumFit {
    pub model: FitFunction,
    pub params: Vec<f64>,
    /// `sqrt(diag((JᵀJ)⁻¹))`, absent when the normal matrix is singular.
    pub errors: Option<Vec<f64>>,
    /// Background polynomial reference point (the expected mean).
    pub pivot: f64,
    pub bin_width: f64,
    pub chi2: f64,
    pub ndf: usize,
    pub iterations: usize,
    /// `(bin center, content)` of the bins that entered the fit.
    pub data: Vec<(f64, f64)>,
}

impl SpectrumFit {
    pub fn predict(&self, x: f64) -> f64 {
        predict(self.model, x, &self.params, self.pivot)
    }

    pub fn background(&self, x: f64) -> f64 {
        background(self.model, x, &self.params, self.pivot)
    }

    /// Total fitted curve integrated over `[low, high]`, in entries.
    pub fn yield_in(&self, low: f64, high: f64) -> f64 {
        simpson(|x| self.predict(x), low, high, SIMPSON_PANELS) / self.bin_width
    }

    /// Signal component integrated over `[low, high]`, in entries.
    pub fn peak_yield_in(&self, low: f64, high: f64) -> f64 {
        simpson(|x| signal(self.model, x, &self.params), low, high, SIMPSON_PANELS) / self.bin_width
    }

    pub fn summary(&self, bundle: &ParameterBundle) -> FitSummary {
        let params = self
            .model
            .param_names()
            .iter()
            .enumerate()
            .map(|(j, name)| NamedParam {
                name: (*name).to_string(),
                value: self.params[j],
                error: self.errors.as_ref().map(|e| e[j]),
            })
            .collect();
        FitSummary {
            chi2: self.chi2,
            ndf: self.ndf,
            iterations: self.iterations,
            params,
            peak_yield: self.peak_yield_in(bundle.signal_range_low, bundle.signal_range_high),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Bin {
    x: f64,
    y: f64,
    sigma: f64,
}

/// Fit `model` to one mass spectrum (`contents` binned on `axis`).
pub fn fit_spectrum(
    model: FitFunction,
    axis: &Axis,
    contents: &[f64],
    bundle: &ParameterBundle,
    opts: &FitOptions,
) -> Result<SpectrumFit, TnpError> {
    if contents.len() != axis.bins {
        return Err(TnpError::HistogramShape(format!(
            "spectrum has {} contents for {} bins",
            contents.len(),
            axis.bins
        )));
    }

    let bins: Vec<Bin> = contents
        .iter()
        .enumerate()
        .map(|(i, &y)| (axis.bin_center(i), y))
        .filter(|&(x, _)| bundle.in_fit_range(x))
        .map(|(x, y)| Bin {
            x,
            y,
            sigma: y.max(1.0).sqrt(),
        })
        .collect();

    let m = model.param_len();
    if bins.len() <= m {
        return Err(TnpError::fit(format!(
            "{} bins in fit range [{}, {}], need at least {}",
            bins.len(),
            bundle.fit_range_low,
            bundle.fit_range_high,
            m + 1
        )));
    }
    if bins.iter().any(|b| !b.y.is_finite()) {
        return Err(TnpError::fit("non-finite bin content in fit range"));
    }

    let pivot = bundle.expected_mean;
    let seed = seed_params(model, &bins, bundle);
    let (mut params, iterations) = minimize(model, &bins, pivot, seed, opts)?;

    // Only the width's magnitude is meaningful.
    params[2] = params[2].abs();
    if !(params[2].is_finite() && params[2] > 0.0) || params.iter().any(|p| !p.is_finite()) {
        return Err(TnpError::fit(format!(
            "{} parameters degenerate at solution: {params:?}",
            model.name()
        )));
    }

    let chi2 = chi_square(model, &bins, &params, pivot);
    let errors = parameter_errors(model, &bins, &params, pivot);

    Ok(SpectrumFit {
        model,
        params,
        errors,
        pivot,
        bin_width: axis.bin_width(),
        chi2,
        ndf: bins.len() - m,
        iterations,
        data: bins.iter().map(|b| (b.x, b.y)).collect(),
    })
}

fn minimize(
    model: FitFunction,
    bins: &[Bin],
    pivot: f64,
    mut params: Vec<f64>,
    opts: &FitOptions,
) -> Result<(Vec<f64>, usize), TnpError> {
    let n = bins.len();
    let m = params.len();

    let mut chi2 = chi_square(model, bins, &params, pivot);
    if !chi2.is_finite() {
        return Err(TnpError::fit("non-finite χ² at the seed parameters"));
    }

    let mut lambda = opts.lambda_initial;
    let mut row = vec![0.0; m];

    for iteration in 1..=opts.max_iterations {
        // Weighted Jacobian and residuals at the current parameters.
        let mut jw = DMatrix::<f64>::zeros(n, m);
        let mut rw = DVector::<f64>::zeros(n);
        for (i, b) in bins.iter().enumerate() {
            fill_jacobian_row(model, b.x, &params, pivot, &mut row);
            for j in 0..m {
                jw[(i, j)] = row[j] / b.sigma;
            }
            rw[i] = (b.y - predict(model, b.x, &params, pivot)) / b.sigma;
        }
        let scales: Vec<f64> = (0..m)
            .map(|j| jw.column(j).norm_squared().max(1e-12).sqrt())
            .collect();

        // Inner loop: raise the damping until a step goes downhill.
        let accepted = loop {
            if lambda > opts.lambda_max {
                break None;
            }
            let mut a = DMatrix::<f64>::zeros(n + m, m);
            a.view_mut((0, 0), (n, m)).copy_from(&jw);
            let mut rhs = DVector::<f64>::zeros(n + m);
            rhs.rows_mut(0, n).copy_from(&rw);
            let damp = lambda.sqrt();
            for j in 0..m {
                a[(n + j, j)] = damp * scales[j];
            }

            let Some(delta) = solve_least_squares(&a, &rhs) else {
                lambda *= 10.0;
                continue;
            };
            let trial: Vec<f64> = params.iter().zip(delta.iter()).map(|(p, d)| p + d).collect();
            let trial_chi2 = chi_square(model, bins, &trial, pivot);
            if trial_chi2.is_finite() && trial_chi2 <= chi2 {
                lambda = (lambda / 10.0).max(1e-15);
                break Some((trial, trial_chi2));
            }
            lambda *= 10.0;
        };

        let Some((trial, trial_chi2)) = accepted else {
            // No downhill direction left: the current point is a minimum.
            return Ok((params, iteration));
        };

        let decrease = chi2 - trial_chi2;
        params = trial;
        chi2 = trial_chi2;
        if decrease <= opts.tolerance * chi2 + 1e-12 {
            return Ok((params, iteration));
        }
    }

    Err(TnpError::fit(format!(
        "{} did not converge within {} iterations (χ²={chi2:.4})",
        model.name(),
        opts.max_iterations
    )))
}

fn chi_square(model: FitFunction, bins: &[Bin], params: &[f64], pivot: f64) -> f64 {
    bins.iter()
        .map(|b| {
            let r = (b.y - predict(model, b.x, params, pivot)) / b.sigma;
            r * r
        })
        .sum()
}

fn parameter_errors(model: FitFunction, bins: &[Bin], params: &[f64], pivot: f64) -> Option<Vec<f64>> {
    let m = params.len();
    let mut jw = DMatrix::<f64>::zeros(bins.len(), m);
    let mut row = vec![0.0; m];
    for (i, b) in bins.iter().enumerate() {
        fill_jacobian_row(model, b.x, params, pivot, &mut row);
        for j in 0..m {
            jw[(i, j)] = row[j] / b.sigma;
        }
    }
    let cov = invert_normal_matrix(&(jw.transpose() * &jw))?;
    let errors: Vec<f64> = (0..m).map(|j| cov[(j, j)].sqrt()).collect();
    if errors.iter().all(|e| e.is_finite()) {
        Some(errors)
    } else {
        None
    }
}

/// Seed parameters from the bundle and the data.
///
/// - peak position and width come from the bundle
/// - the background is regressed on the sidebands (bins outside the signal window)
/// - the amplitude is the largest excess over that background inside the window
fn seed_params(model: FitFunction, bins: &[Bin], bundle: &ParameterBundle) -> Vec<f64> {
    let pivot = bundle.expected_mean;
    let mut sidebands: Vec<Bin> = bins
        .iter()
        .copied()
        .filter(|b| !bundle.in_signal_range(b.x))
        .collect();
    if sidebands.len() < 2 {
        sidebands = bins.to_vec();
    }

    let mean_level = sidebands.iter().map(|b| b.y).sum::<f64>() / sidebands.len() as f64;
    let (b0, b1) = match model {
        FitFunction::GaussianPlusExponential => (mean_level.max(1e-6), 0.0),
        _ => linear_sideband_fit(&sidebands, pivot).unwrap_or((mean_level, 0.0)),
    };

    let bg = |x: f64| match model {
        FitFunction::GaussianPlusExponential => b0,
        _ => b0 + b1 * (x - pivot),
    };
    let amplitude = bins
        .iter()
        .filter(|b| bundle.in_signal_range(b.x))
        .map(|b| b.y - bg(b.x))
        .fold(0.0_f64, f64::max);

    let width = match model {
        FitFunction::BreitWignerPlusLinear => bundle.width,
        _ => bundle.expected_sigma,
    };

    let mut params = vec![amplitude, bundle.expected_mean, width, b0, b1];
    if model == FitFunction::GaussianPlusQuadratic {
        params.push(0.0);
    }
    params
}

fn linear_sideband_fit(bins: &[Bin], pivot: f64) -> Option<(f64, f64)> {
    let mut a = DMatrix::<f64>::zeros(bins.len(), 2);
    let mut y = DVector::<f64>::zeros(bins.len());
    for (i, b) in bins.iter().enumerate() {
        a[(i, 0)] = 1.0;
        a[(i, 1)] = b.x - pivot;
        y[i] = b.y;
    }
    let beta = solve_least_squares(&a, &y)?;
    Some((beta[0], beta[1]))
}
