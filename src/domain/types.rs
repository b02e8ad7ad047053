//! Shared domain types.
//!
//! These types are kept plain and serializable so they can be:
//!
//! - built from the TOML run configuration
//! - passed through the fit engine by reference
//! - written back to a JSON store file as derived results

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::Axis;
use crate::error::TnpError;

/// Fit configuration shared by one or more efficiency specs.
///
/// Defaults mirror the generic tag-and-probe parameter set used for Z → ee:
/// a Gaussian peak at 91 GeV on a linear background, fitted over [65, 115]
/// and integrated over [81, 101].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterBundle {
    /// 1: 1-D mass histograms. 2: 2-D histograms, mass on x, probe variable on y.
    pub mass_dimension: u8,
    /// Catalog name of the fit shape, resolved with [`FitFunction::from_str`].
    pub fit_function: String,
    pub expected_mean: f64,
    /// Initial Gaussian width.
    pub expected_sigma: f64,
    /// Initial Breit-Wigner width.
    pub width: f64,
    pub fit_range_low: f64,
    pub fit_range_high: f64,
    pub signal_range_low: f64,
    pub signal_range_high: f64,
}

impl Default for ParameterBundle {
    fn default() -> Self {
        Self {
            mass_dimension: 2,
            fit_function: FitFunction::GaussianPlusLinear.name().to_string(),
            expected_mean: 91.0,
            expected_sigma: 1.0,
            width: 2.5,
            fit_range_low: 65.0,
            fit_range_high: 115.0,
            signal_range_low: 81.0,
            signal_range_high: 101.0,
        }
    }
}

impl ParameterBundle {
    /// Check the window ordering and the basic sanity of every field.
    pub fn validate(&self) -> Result<(), TnpError> {
        if !matches!(self.mass_dimension, 1 | 2) {
            return Err(TnpError::Config(format!(
                "mass_dimension must be 1 or 2, got {}",
                self.mass_dimension
            )));
        }

        let numeric = [
            ("expected_mean", self.expected_mean),
            ("expected_sigma", self.expected_sigma),
            ("width", self.width),
            ("fit_range_low", self.fit_range_low),
            ("fit_range_high", self.fit_range_high),
            ("signal_range_low", self.signal_range_low),
            ("signal_range_high", self.signal_range_high),
        ];
        if let Some((name, v)) = numeric.iter().find(|(_, v)| !v.is_finite()) {
            return Err(TnpError::Config(format!("{name} must be finite, got {v}")));
        }
        if self.expected_sigma <= 0.0 {
            return Err(TnpError::Config(format!(
                "expected_sigma must be > 0, got {}",
                self.expected_sigma
            )));
        }
        if self.width <= 0.0 {
            return Err(TnpError::Config(format!("width must be > 0, got {}", self.width)));
        }

        let ordered = self.fit_range_low < self.signal_range_low
            && self.signal_range_low < self.signal_range_high
            && self.signal_range_high < self.fit_range_high;
        if !ordered {
            return Err(TnpError::Config(format!(
                "windows must satisfy fit_low < signal_low < signal_high < fit_high, got \
                 fit=[{}, {}] signal=[{}, {}]",
                self.fit_range_low, self.fit_range_high, self.signal_range_low, self.signal_range_high
            )));
        }
        Ok(())
    }

    /// Return a copy of `self` with the `Some` fields of `overrides` replaced.
    ///
    /// The result is validated; `self` is never modified.
    pub fn with_overrides(&self, overrides: &BundleOverrides) -> Result<Self, TnpError> {
        let out = Self {
            mass_dimension: overrides.mass_dimension.unwrap_or(self.mass_dimension),
            fit_function: overrides
                .fit_function
                .clone()
                .unwrap_or_else(|| self.fit_function.clone()),
            expected_mean: overrides.expected_mean.unwrap_or(self.expected_mean),
            expected_sigma: overrides.expected_sigma.unwrap_or(self.expected_sigma),
            width: overrides.width.unwrap_or(self.width),
            fit_range_low: overrides.fit_range_low.unwrap_or(self.fit_range_low),
            fit_range_high: overrides.fit_range_high.unwrap_or(self.fit_range_high),
            signal_range_low: overrides.signal_range_low.unwrap_or(self.signal_range_low),
            signal_range_high: overrides.signal_range_high.unwrap_or(self.signal_range_high),
        };
        out.validate()?;
        Ok(out)
    }

    /// Closed-interval check used to select fit bins by center.
    pub fn in_fit_range(&self, x: f64) -> bool {
        x >= self.fit_range_low && x <= self.fit_range_high
    }

    pub fn in_signal_range(&self, x: f64) -> bool {
        x >= self.signal_range_low && x <= self.signal_range_high
    }
}

/// Field-by-field overrides for a [`ParameterBundle`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BundleOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mass_dimension: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit_function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_mean: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_sigma: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit_range_low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit_range_high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_range_low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_range_high: Option<f64>,
}

impl BundleOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overrides that reproduce `bundle` exactly when applied to the defaults.
    pub fn from_bundle(bundle: &ParameterBundle) -> Self {
        Self {
            mass_dimension: Some(bundle.mass_dimension),
            fit_function: Some(bundle.fit_function.clone()),
            expected_mean: Some(bundle.expected_mean),
            expected_sigma: Some(bundle.expected_sigma),
            width: Some(bundle.width),
            fit_range_low: Some(bundle.fit_range_low),
            fit_range_high: Some(bundle.fit_range_high),
            signal_range_low: Some(bundle.signal_range_low),
            signal_range_high: Some(bundle.signal_range_high),
        }
    }
}

/// Catalog of supported fit shapes (signal peak + background).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitFunction {
    GaussianPlusLinear,
    GaussianPlusQuadratic,
    GaussianPlusExponential,
    BreitWignerPlusLinear,
}

impl FitFunction {
    pub const ALL: [FitFunction; 4] = [
        FitFunction::GaussianPlusLinear,
        FitFunction::GaussianPlusQuadratic,
        FitFunction::GaussianPlusExponential,
        FitFunction::BreitWignerPlusLinear,
    ];

    /// Name used in configuration files.
    pub fn name(self) -> &'static str {
        match self {
            FitFunction::GaussianPlusLinear => "GaussianPlusLinear",
            FitFunction::GaussianPlusQuadratic => "GaussianPlusQuadratic",
            FitFunction::GaussianPlusExponential => "GaussianPlusExponential",
            FitFunction::BreitWignerPlusLinear => "BreitWignerPlusLinear",
        }
    }

    /// Parameter names, signal parameters first.
    pub fn param_names(self) -> &'static [&'static str] {
        match self {
            FitFunction::GaussianPlusLinear => &["amplitude", "mean", "sigma", "b0", "b1"],
            FitFunction::GaussianPlusQuadratic => &["amplitude", "mean", "sigma", "b0", "b1", "b2"],
            FitFunction::GaussianPlusExponential => &["amplitude", "mean", "sigma", "b0", "slope"],
            FitFunction::BreitWignerPlusLinear => &["amplitude", "mean", "gamma", "b0", "b1"],
        }
    }

    pub fn param_len(self) -> usize {
        self.param_names().len()
    }
}

impl FromStr for FitFunction {
    type Err = TnpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FitFunction::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| TnpError::UnsupportedFitModel(s.to_string()))
    }
}

impl std::fmt::Display for FitFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One efficiency to derive: passing probes over all probes.
#[derive(Debug, Clone, PartialEq)]
pub struct EfficiencySpec {
    pub numerator: String,
    pub denominator: String,
    pub output: String,
    /// Fully resolved bundle (shared base plus this efficiency's overrides).
    pub bundle: ParameterBundle,
}

/// Immutable configuration of one tag-and-probe client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub label: String,
    pub root_folder: String,
    pub verbose: bool,
    /// Directory receiving one SVG fit overlay per efficiency.
    pub plot_dump_path: Option<PathBuf>,
    pub efficiencies: Vec<EfficiencySpec>,
}

impl ClientConfig {
    /// The client from the EG trigger configuration: tight-ID electrons over tracks.
    pub fn eg_default() -> Self {
        Self {
            label: "dqmGenericTnPClientEG".to_string(),
            root_folder: normalize_folder("HLT/EG/"),
            verbose: false,
            plot_dump_path: None,
            efficiencies: vec![EfficiencySpec {
                numerator: "TightIDElectrons".to_string(),
                denominator: "tracks".to_string(),
                output: "effTight".to_string(),
                bundle: ParameterBundle::default(),
            }],
        }
    }
}

/// Strip surrounding slashes so `"HLT/EG/"` and `"HLT/EG"` address the same folder.
pub fn normalize_folder(folder: &str) -> String {
    folder.trim_matches('/').to_string()
}

/// A fitted parameter with its uncertainty (when the covariance is available).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedParam {
    pub name: String,
    pub value: f64,
    pub error: Option<f64>,
}

/// Fit quality and converged parameters of one spectrum fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitSummary {
    pub chi2: f64,
    pub ndf: usize,
    pub iterations: usize,
    pub params: Vec<NamedParam>,
    /// Signal component alone, integrated over the signal window.
    pub peak_yield: f64,
}

impl FitSummary {
    pub fn chi2_per_ndf(&self) -> f64 {
        if self.ndf == 0 {
            f64::NAN
        } else {
            self.chi2 / self.ndf as f64
        }
    }
}

/// A valid efficiency measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyValue {
    pub efficiency: f64,
    pub error: f64,
    pub numerator_yield: f64,
    pub denominator_yield: f64,
    pub numerator_fit: FitSummary,
    pub denominator_fit: FitSummary,
}

/// One point of an efficiency result.
///
/// For 1-D inputs there is a single bin spanning the signal window; for 2-D
/// inputs there is one bin per probe-variable bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyBin {
    pub low: f64,
    pub high: f64,
    pub value: Option<EfficiencyValue>,
    pub failure: Option<String>,
}

/// Derived efficiency written back to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyResult {
    pub name: String,
    pub numerator: String,
    pub denominator: String,
    pub fit_function: FitFunction,
    pub variable_axis: Option<Axis>,
    pub bins: Vec<EfficiencyBin>,
}

impl EfficiencyResult {
    pub fn valid_bins(&self) -> impl Iterator<Item = (&EfficiencyBin, &EfficiencyValue)> {
        self.bins.iter().filter_map(|b| b.value.as_ref().map(|v| (b, v)))
    }

    pub fn failed_count(&self) -> usize {
        self.bins.iter().filter(|b| b.value.is_none()).count()
    }
}
