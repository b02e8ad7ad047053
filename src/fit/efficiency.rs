//! Efficiency evaluation: fit passing and all probes, integrate, divide.
//!
//! For every mass slice (one for 1-D inputs, one per probe-variable bin for 2-D):
//! 1. fit the denominator (all probes) and numerator (passing probes) independently
//! 2. integrate each fitted total curve over the signal window
//! 3. `ε = N_num / N_den`, `σ_ε = sqrt(ε̂(1 - ε̂) / N_den)` with `ε̂ = clamp(ε, 0, 1)`
//!
//! A failed slice is kept as an invalid bin; an efficiency fails as a whole only when
//! no slice produced a value.

use crate::domain::{
    Axis, EfficiencyBin, EfficiencyResult, EfficiencySpec, EfficiencyValue, FitFunction, Histogram,
    ParameterBundle,
};
use crate::error::TnpError;
use crate::fit::fitter::{FitOptions, SpectrumFit, fit_spectrum};

/// Both fits and the derived value of one slice.
#[derive(Debug, Clone)]
pub struct SliceFit {
    pub numerator: SpectrumFit,
    pub denominator: SpectrumFit,
    pub value: EfficiencyValue,
}

/// Outcome of one slice; `low`/`high` are the probe-variable edges.
#[derive(Debug)]
pub struct SliceEvaluation {
    pub index: usize,
    pub low: f64,
    pub high: f64,
    pub outcome: Result<SliceFit, TnpError>,
}

/// All slices of one efficiency.
#[derive(Debug)]
pub struct Evaluation {
    pub model: FitFunction,
    pub variable_axis: Option<Axis>,
    pub slices: Vec<SliceEvaluation>,
}

impl Evaluation {
    pub fn valid_count(&self) -> usize {
        self.slices.iter().filter(|s| s.outcome.is_ok()).count()
    }

    /// Convert into the stored result.
    ///
    /// Fails with the first slice error when no slice produced a value.
    pub fn into_result(self, spec: &EfficiencySpec) -> Result<EfficiencyResult, TnpError> {
        if self.valid_count() == 0 {
            let first = self.slices.into_iter().find_map(|s| s.outcome.err());
            return Err(first.unwrap_or_else(|| TnpError::fit("no slices to evaluate")));
        }

        let bins = self
            .slices
            .into_iter()
            .map(|s| match s.outcome {
                Ok(fit) => EfficiencyBin {
                    low: s.low,
                    high: s.high,
                    value: Some(fit.value),
                    failure: None,
                },
                Err(e) => EfficiencyBin {
                    low: s.low,
                    high: s.high,
                    value: None,
                    failure: Some(e.to_string()),
                },
            })
            .collect();

        Ok(EfficiencyResult {
            name: spec.output.clone(),
            numerator: spec.numerator.clone(),
            denominator: spec.denominator.clone(),
            fit_function: self.model,
            variable_axis: self.variable_axis,
            bins,
        })
    }
}

/// Binomial uncertainty of `efficiency` measured on `denominator_yield` probes.
pub fn binomial_error(efficiency: f64, denominator_yield: f64) -> f64 {
    if !(denominator_yield > 0.0) {
        return f64::NAN;
    }
    let e = efficiency.clamp(0.0, 1.0);
    (e * (1.0 - e) / denominator_yield).sqrt()
}

/// Check that both histograms match the bundle's mass dimension and each other.
pub fn check_shapes(
    bundle: &ParameterBundle,
    numerator: &Histogram,
    denominator: &Histogram,
) -> Result<(), TnpError> {
    for (role, h) in [("numerator", numerator), ("denominator", denominator)] {
        if h.dimension() != bundle.mass_dimension {
            return Err(TnpError::HistogramShape(format!(
                "{role} is {}-D but mass_dimension is {}",
                h.dimension(),
                bundle.mass_dimension
            )));
        }
        h.validate().map_err(|e| match e {
            TnpError::HistogramShape(msg) => TnpError::HistogramShape(format!("{role}: {msg}")),
            other => other,
        })?;
    }
    if numerator.x != denominator.x || numerator.y != denominator.y {
        return Err(TnpError::HistogramShape(
            "numerator and denominator binnings differ".to_string(),
        ));
    }
    Ok(())
}

/// Evaluate every slice of `spec` on the given histograms.
pub fn evaluate_efficiency(
    spec: &EfficiencySpec,
    model: FitFunction,
    numerator: &Histogram,
    denominator: &Histogram,
    opts: &FitOptions,
) -> Result<Evaluation, TnpError> {
    let bundle = &spec.bundle;
    check_shapes(bundle, numerator, denominator)?;

    let slices = match denominator.y {
        None => vec![SliceEvaluation {
            index: 0,
            low: bundle.signal_range_low,
            high: bundle.signal_range_high,
            outcome: evaluate_slice(model, bundle, &denominator.x, numerator.x_slice(0), denominator.x_slice(0), opts),
        }],
        Some(y_axis) => (0..y_axis.bins)
            .map(|iy| SliceEvaluation {
                index: iy,
                low: y_axis.bin_low(iy),
                high: y_axis.bin_low(iy + 1),
                outcome: evaluate_slice(
                    model,
                    bundle,
                    &denominator.x,
                    numerator.x_slice(iy),
                    denominator.x_slice(iy),
                    opts,
                ),
            })
            .collect(),
    };

    Ok(Evaluation {
        model,
        variable_axis: denominator.y,
        slices,
    })
}

/// Fit one numerator/denominator pair of mass spectra.
pub fn evaluate_slice(
    model: FitFunction,
    bundle: &ParameterBundle,
    mass_axis: &Axis,
    numerator: &[f64],
    denominator: &[f64],
    opts: &FitOptions,
) -> Result<SliceFit, TnpError> {
    let den_fit = fit_spectrum(model, mass_axis, denominator, bundle, opts)?;
    let num_fit = fit_spectrum(model, mass_axis, numerator, bundle, opts)?;

    let (lo, hi) = (bundle.signal_range_low, bundle.signal_range_high);
    let denominator_yield = den_fit.yield_in(lo, hi);
    let numerator_yield = num_fit.yield_in(lo, hi);

    if !(denominator_yield.is_finite() && denominator_yield > 0.0) {
        return Err(TnpError::DegenerateYield {
            yield_: denominator_yield,
        });
    }
    if !numerator_yield.is_finite() {
        return Err(TnpError::fit("non-finite numerator yield"));
    }

    let efficiency = numerator_yield / denominator_yield;
    let value = EfficiencyValue {
        efficiency,
        error: binomial_error(efficiency, denominator_yield),
        numerator_yield,
        denominator_yield,
        numerator_fit: num_fit.summary(bundle),
        denominator_fit: den_fit.summary(bundle),
    };

    Ok(SliceFit {
        numerator: num_fit,
        denominator: den_fit,
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ParameterBundle;

    fn spec(bundle: ParameterBundle) -> EfficiencySpec {
        EfficiencySpec {
            numerator: "pass".to_string(),
            denominator: "all".to_string(),
            output: "eff".to_string(),
            bundle,
        }
    }

    fn flat(entries: f64) -> Histogram {
        let axis = Axis::new(50, 65.0, 115.0).unwrap();
        Histogram::from_contents(axis, vec![entries / 50.0; 50]).unwrap()
    }

    #[test]
    fn flat_spectra_give_ratio_of_entries() {
        let bundle = ParameterBundle {
            mass_dimension: 1,
            ..ParameterBundle::default()
        };
        let spec = spec(bundle);
        let eval = evaluate_efficiency(
            &spec,
            FitFunction::GaussianPlusLinear,
            &flat(750.0),
            &flat(1000.0),
            &FitOptions::default(),
        )
        .unwrap();
        let result = eval.into_result(&spec).unwrap();

        assert_eq!(result.bins.len(), 1);
        let v = result.bins[0].value.as_ref().unwrap();
        assert!((v.denominator_yield - 400.0).abs() < 1e-6);
        assert!((v.numerator_yield - 300.0).abs() < 1e-6);
        assert!((v.efficiency - 0.75).abs() < 1e-9);
        let expected_error = (0.75_f64 * 0.25 / 400.0).sqrt();
        assert!((v.error - expected_error).abs() < 1e-9);
    }

    #[test]
    fn binomial_error_edges() {
        assert_eq!(binomial_error(1.0, 100.0), 0.0);
        assert_eq!(binomial_error(1.2, 100.0), 0.0);
        assert!((binomial_error(0.5, 100.0) - 0.05).abs() < 1e-12);
        assert!(binomial_error(0.5, 0.0).is_nan());
    }

    #[test]
    fn dimension_mismatch_is_a_shape_error() {
        let spec = spec(ParameterBundle::default()); // mass_dimension = 2
        let err = evaluate_efficiency(
            &spec,
            FitFunction::GaussianPlusLinear,
            &flat(750.0),
            &flat(1000.0),
            &FitOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, TnpError::HistogramShape(_)));
    }

    #[test]
    fn binning_mismatch_is_a_shape_error() {
        let bundle = ParameterBundle {
            mass_dimension: 1,
            ..ParameterBundle::default()
        };
        let other = Histogram::from_contents(Axis::new(25, 65.0, 115.0).unwrap(), vec![10.0; 25]).unwrap();
        let err = check_shapes(&bundle, &other, &flat(1000.0)).unwrap_err();
        assert!(matches!(err, TnpError::HistogramShape(_)));
    }

    #[test]
    fn two_d_slices_keep_failures_as_invalid_bins() {
        let mass = Axis::new(50, 65.0, 115.0).unwrap();
        let eta = Axis::new(3, -1.5, 1.5).unwrap();
        let mut den = Histogram::new_2d(mass, eta);
        let mut num = Histogram::new_2d(mass, eta);
        // Slices 0 and 2 flat, slice 1 left empty.
        for iy in [0usize, 2] {
            for ix in 0..mass.bins {
                den.contents[iy * mass.bins + ix] = 20.0;
                num.contents[iy * mass.bins + ix] = if iy == 0 { 10.0 } else { 18.0 };
            }
        }

        let spec = spec(ParameterBundle::default());
        let eval = evaluate_efficiency(&spec, FitFunction::GaussianPlusLinear, &num, &den, &FitOptions::default())
            .unwrap();
        assert_eq!(eval.valid_count(), 2);
        assert!(matches!(eval.slices[1].outcome, Err(TnpError::DegenerateYield { .. })));

        let result = eval.into_result(&spec).unwrap();
        assert_eq!(result.bins.len(), 3);
        assert_eq!(result.failed_count(), 1);
        assert!((result.bins[0].low + 1.5).abs() < 1e-12);
        assert!((result.bins[0].high + 0.5).abs() < 1e-12);
        let e0 = result.bins[0].value.as_ref().unwrap().efficiency;
        let e2 = result.bins[2].value.as_ref().unwrap().efficiency;
        assert!((e0 - 0.5).abs() < 1e-9);
        assert!((e2 - 0.9).abs() < 1e-9);
        assert!(result.bins[1].failure.is_some());
    }

    #[test]
    fn all_slices_failing_fails_the_spec() {
        let bundle = ParameterBundle {
            mass_dimension: 1,
            ..ParameterBundle::default()
        };
        let spec = spec(bundle);
        let empty = flat(0.0);
        let eval = evaluate_efficiency(&spec, FitFunction::GaussianPlusLinear, &empty, &empty, &FitOptions::default())
            .unwrap();
        let err = eval.into_result(&spec).unwrap_err();
        assert!(matches!(err, TnpError::DegenerateYield { .. }));
    }
}
