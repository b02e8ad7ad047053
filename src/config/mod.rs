//! TOML run configuration.
//!
//! A file declares named parameter bundles, tag-and-probe clients with their
//! efficiencies, and optionally the module order of the sequence. Everything is
//! resolved and validated here, before any client runs:
//!
//! ```toml
//! [bundles.dqm_generic_tnp]
//! mass_dimension = 2
//!
//! [[clients]]
//! label = "dqmGenericTnPClientEG"
//! root_folder = "HLT/EG/"
//!
//! [[clients.efficiencies]]
//! bundle = "dqm_generic_tnp"
//! numerator = "TightIDElectrons"
//! denominator = "tracks"
//! output = "effTight"
//! fit_range_low = 60
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::TagAndProbeClient;
use crate::domain::{BundleOverrides, ClientConfig, EfficiencySpec, ParameterBundle, normalize_folder};
use crate::error::{ConfigFileError, TnpError};
use crate::sequence::{ClientModule, HLT_OFFLINE_CLIENT_SEQUENCE, Sequence};

/// Name under which the built-in configuration declares its bundle.
pub const DEFAULT_BUNDLE_NAME: &str = "dqm_generic_tnp";

/// Environment variable naming a default configuration file.
pub const CONFIG_ENV: &str = "TNP_CONFIG";

/// Configuration file as written on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    /// Named bundles, each given as overrides of the defaults.
    #[serde(default)]
    pub bundles: BTreeMap<String, BundleOverrides>,

    #[serde(default)]
    pub clients: Vec<RawClient>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<RawSequence>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawClient {
    pub label: String,
    pub root_folder: String,

    #[serde(default)]
    pub verbose: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot_dump_path: Option<PathBuf>,

    #[serde(default)]
    pub efficiencies: Vec<RawEfficiency>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEfficiency {
    pub numerator: String,
    pub denominator: String,
    pub output: String,

    /// Named base bundle; the built-in defaults when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<String>,

    /// Remaining keys are bundle field overrides, checked when resolved.
    #[serde(flatten)]
    pub overrides: toml::Table,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSequence {
    pub modules: Vec<String>,
}

/// Resolved, validated run configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub clients: Vec<ClientConfig>,
    /// Module labels in execution order.
    pub sequence: Vec<String>,
}

impl RunConfig {
    /// Built-in configuration: the EG client placed in the HLT offline client sequence.
    pub fn builtin() -> Self {
        let client = ClientConfig::eg_default();
        let mut sequence: Vec<String> = HLT_OFFLINE_CLIENT_SEQUENCE.iter().map(|s| s.to_string()).collect();
        let at = sequence
            .iter()
            .position(|m| m == "HiJetClient")
            .map(|i| i + 1)
            .unwrap_or(sequence.len());
        sequence.insert(at, client.label.clone());

        Self {
            clients: vec![client],
            sequence,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigFileError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;
        Self::from_toml_str(&content, path)
    }

    /// Parse and resolve `content`; `origin` is only used in error messages.
    pub fn from_toml_str(content: &str, origin: &Path) -> Result<Self, ConfigFileError> {
        let raw: RawConfig = toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            path: origin.to_owned(),
            source: e,
        })?;
        Self::resolve(raw)
    }

    pub fn resolve(raw: RawConfig) -> Result<Self, ConfigFileError> {
        let mut bundles = BTreeMap::new();
        for (name, overrides) in &raw.bundles {
            let bundle = ParameterBundle::default()
                .with_overrides(overrides)
                .map_err(|source| ConfigFileError::InvalidBundle {
                    location: format!("bundle '{name}'"),
                    source,
                })?;
            bundles.insert(name.clone(), bundle);
        }

        let mut labels = BTreeSet::new();
        let mut clients = Vec::with_capacity(raw.clients.len());
        for c in raw.clients {
            if !labels.insert(c.label.clone()) {
                return Err(ConfigFileError::DuplicateLabel(c.label));
            }
            let mut efficiencies = Vec::with_capacity(c.efficiencies.len());
            for e in c.efficiencies {
                efficiencies.push(resolve_efficiency(&c.label, e, &bundles)?);
            }
            clients.push(ClientConfig {
                label: c.label,
                root_folder: normalize_folder(&c.root_folder),
                verbose: c.verbose,
                plot_dump_path: c.plot_dump_path,
                efficiencies,
            });
        }

        let sequence = match raw.sequence {
            Some(s) => s.modules,
            None => clients.iter().map(|c| c.label.clone()).collect(),
        };

        debug!(clients = clients.len(), modules = sequence.len(), "configuration resolved");
        Ok(Self { clients, sequence })
    }

    /// File form of this configuration.
    ///
    /// Efficiencies sharing the default bundle reference it by name; any
    /// difference is written as per-efficiency overrides.
    pub fn to_raw(&self) -> Result<RawConfig, ConfigFileError> {
        let base = ParameterBundle::default();
        let mut raw = RawConfig::default();
        raw.bundles
            .insert(DEFAULT_BUNDLE_NAME.to_string(), BundleOverrides::from_bundle(&base));

        for c in &self.clients {
            let mut efficiencies = Vec::with_capacity(c.efficiencies.len());
            for e in &c.efficiencies {
                let overrides = toml::Table::try_from(bundle_diff(&base, &e.bundle))?;
                efficiencies.push(RawEfficiency {
                    numerator: e.numerator.clone(),
                    denominator: e.denominator.clone(),
                    output: e.output.clone(),
                    bundle: Some(DEFAULT_BUNDLE_NAME.to_string()),
                    overrides,
                });
            }
            raw.clients.push(RawClient {
                label: c.label.clone(),
                root_folder: c.root_folder.clone(),
                verbose: c.verbose,
                plot_dump_path: c.plot_dump_path.clone(),
                efficiencies,
            });
        }

        raw.sequence = Some(RawSequence {
            modules: self.sequence.clone(),
        });
        Ok(raw)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigFileError> {
        Ok(toml::to_string_pretty(&self.to_raw()?)?)
    }

    /// Instantiate the configured clients and order them by `sequence`.
    pub fn build_sequence(&self) -> Sequence {
        let clients: Vec<Box<dyn ClientModule>> = self
            .clients
            .iter()
            .map(|c| Box::new(TagAndProbeClient::new(c.clone())) as Box<dyn ClientModule>)
            .collect();
        let (sequence, unused) = Sequence::from_labels(&self.sequence, clients);
        for module in &unused {
            warn!(module = %module.label(), "client is configured but not part of the sequence");
        }
        sequence
    }
}

fn resolve_efficiency(
    client: &str,
    raw: RawEfficiency,
    bundles: &BTreeMap<String, ParameterBundle>,
) -> Result<EfficiencySpec, ConfigFileError> {
    let default_bundle;
    let base = match &raw.bundle {
        Some(name) => bundles.get(name).ok_or_else(|| ConfigFileError::UnknownBundle {
            client: client.to_string(),
            output: raw.output.clone(),
            bundle: name.clone(),
        })?,
        None => {
            default_bundle = ParameterBundle::default();
            &default_bundle
        }
    };

    let location = format!("client '{client}' efficiency '{}'", raw.output);
    let overrides: BundleOverrides = toml::Value::Table(raw.overrides)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigFileError::InvalidBundle {
            location: location.clone(),
            source: TnpError::Config(e.to_string()),
        })?;
    let bundle = base
        .with_overrides(&overrides)
        .map_err(|source| ConfigFileError::InvalidBundle { location, source })?;

    Ok(EfficiencySpec {
        numerator: raw.numerator,
        denominator: raw.denominator,
        output: raw.output,
        bundle,
    })
}

/// Overrides turning `base` into `bundle`: only the differing fields are set.
fn bundle_diff(base: &ParameterBundle, bundle: &ParameterBundle) -> BundleOverrides {
    fn differs<T: PartialEq + Clone>(a: &T, b: &T) -> Option<T> {
        (a != b).then(|| b.clone())
    }
    BundleOverrides {
        mass_dimension: differs(&base.mass_dimension, &bundle.mass_dimension),
        fit_function: differs(&base.fit_function, &bundle.fit_function),
        expected_mean: differs(&base.expected_mean, &bundle.expected_mean),
        expected_sigma: differs(&base.expected_sigma, &bundle.expected_sigma),
        width: differs(&base.width, &bundle.width),
        fit_range_low: differs(&base.fit_range_low, &bundle.fit_range_low),
        fit_range_high: differs(&base.fit_range_high, &bundle.fit_range_high),
        signal_range_low: differs(&base.signal_range_low, &bundle.signal_range_low),
        signal_range_high: differs(&base.signal_range_high, &bundle.signal_range_high),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<RunConfig, ConfigFileError> {
        RunConfig::from_toml_str(s, Path::new("test.toml"))
    }

    const SAMPLE: &str = r#"
[bundles.dqm_generic_tnp]
mass_dimension = 1

[bundles.wide]
mass_dimension = 1
fit_range_low = 55
fit_range_high = 125

[[clients]]
label = "tnpEG"
root_folder = "HLT/EG/"
verbose = true

[[clients.efficiencies]]
bundle = "dqm_generic_tnp"
numerator = "TightIDElectrons"
denominator = "tracks"
output = "effTight"

[[clients.efficiencies]]
bundle = "wide"
numerator = "LooseIDElectrons"
denominator = "tracks"
output = "effLoose"
fit_function = "BreitWignerPlusLinear"
signal_range_low = 86

[sequence]
modules = ["egHLTOffDQMClient", "tnpEG"]
"#;

    #[test]
    fn bundles_and_overrides_resolve_per_efficiency() {
        let cfg = parse(SAMPLE).unwrap();
        assert_eq!(cfg.clients.len(), 1);
        let c = &cfg.clients[0];
        assert_eq!(c.root_folder, "HLT/EG");
        assert!(c.verbose);

        let tight = &c.efficiencies[0].bundle;
        assert_eq!(tight.mass_dimension, 1);
        assert_eq!(tight.fit_range_low, 65.0);

        let loose = &c.efficiencies[1].bundle;
        assert_eq!(loose.fit_range_low, 55.0);
        assert_eq!(loose.fit_range_high, 125.0);
        assert_eq!(loose.fit_function, "BreitWignerPlusLinear");
        assert_eq!(loose.signal_range_low, 86.0);
        assert_eq!(loose.signal_range_high, 101.0);

        assert_eq!(cfg.sequence, ["egHLTOffDQMClient", "tnpEG"]);
    }

    #[test]
    fn sequence_defaults_to_declared_clients() {
        let cfg = parse(
            r#"
[[clients]]
label = "a"
root_folder = "A"

[[clients]]
label = "b"
root_folder = "B"
"#,
        )
        .unwrap();
        assert_eq!(cfg.sequence, ["a", "b"]);
        assert!(cfg.clients[0].efficiencies.is_empty());
    }

    #[test]
    fn unknown_bundle_is_rejected() {
        let err = parse(
            r#"
[[clients]]
label = "a"
root_folder = "A"

[[clients.efficiencies]]
bundle = "nope"
numerator = "n"
denominator = "d"
output = "e"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigFileError::UnknownBundle { ref bundle, .. } if bundle == "nope"));
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let err = parse(
            r#"
[[clients]]
label = "a"
root_folder = "A"

[[clients]]
label = "a"
root_folder = "B"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigFileError::DuplicateLabel(ref l) if l == "a"));
    }

    #[test]
    fn window_violations_are_rejected_before_running() {
        let err = parse(
            r#"
[bundles.bad]
signal_range_low = 60
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigFileError::InvalidBundle { .. }));

        let err = parse(
            r#"
[[clients]]
label = "a"
root_folder = "A"

[[clients.efficiencies]]
numerator = "n"
denominator = "d"
output = "e"
fit_range_high = 90
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigFileError::InvalidBundle { source: TnpError::Config(_), .. }));
    }

    #[test]
    fn misspelled_override_is_rejected() {
        let err = parse(
            r#"
[[clients]]
label = "a"
root_folder = "A"

[[clients.efficiencies]]
numerator = "n"
denominator = "d"
output = "e"
fit_rnage_low = 60
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigFileError::InvalidBundle { .. }));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(parse("[[clients]\n"), Err(ConfigFileError::Parse { .. })));
    }

    #[test]
    fn builtin_places_eg_client_after_hi_jet() {
        let cfg = RunConfig::builtin();
        assert_eq!(cfg.sequence.len(), HLT_OFFLINE_CLIENT_SEQUENCE.len() + 1);
        let hi = cfg.sequence.iter().position(|m| m == "HiJetClient").unwrap();
        assert_eq!(cfg.sequence[hi + 1], "dqmGenericTnPClientEG");
        assert_eq!(cfg.sequence[hi + 2], "HLTTauPostSeq");
    }

    #[test]
    fn builtin_round_trips_through_toml() {
        let mut cfg = RunConfig::builtin();
        cfg.clients[0].efficiencies[0].bundle.fit_range_low = 60.0;
        let text = cfg.to_toml_string().unwrap();
        assert!(text.contains("fit_range_low"));
        let back = parse(&text).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn built_sequence_uses_configured_clients() {
        let seq = RunConfig::builtin().build_sequence();
        assert_eq!(seq.len(), HLT_OFFLINE_CLIENT_SEQUENCE.len() + 1);
        assert!(seq.labels().contains(&"dqmGenericTnPClientEG"));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = RunConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigFileError::FileRead { .. }));
    }
}
