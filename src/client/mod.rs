//! The tag-and-probe efficiency client.
//!
//! For each configured efficiency, in declared order, the client resolves the
//! fit shape, looks up both histograms under its root folder, evaluates the
//! efficiency and publishes it back to the store. Failures are logged and the
//! efficiency is skipped; siblings are unaffected.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::domain::{ClientConfig, EfficiencyResult, EfficiencySpec, FitFunction};
use crate::error::TnpError;
use crate::fit::{Evaluation, FitOptions, evaluate_efficiency};
use crate::plot::{OverlayPanel, write_fit_overlay};
use crate::report::format_slice_report;
use crate::sequence::{ClientModule, ClientSummary};
use crate::store::HistogramStore;

/// A configured tag-and-probe client.
#[derive(Debug, Clone)]
pub struct TagAndProbeClient {
    config: ClientConfig,
    fit_options: FitOptions,
}

impl TagAndProbeClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            fit_options: FitOptions::default(),
        }
    }

    pub fn with_fit_options(mut self, fit_options: FitOptions) -> Self {
        self.fit_options = fit_options;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Evaluate one efficiency and publish its result.
    ///
    /// On `Err` the output is absent from the store, including any result an
    /// earlier run left under the same name.
    pub fn process(&self, spec: &EfficiencySpec, store: &mut dyn HistogramStore) -> Result<(), TnpError> {
        let folder = &self.config.root_folder;
        match self.evaluate(spec, store) {
            Ok(result) => {
                store.put(folder, &spec.output, result);
                Ok(())
            }
            Err(e) => {
                if store.remove(folder, &spec.output) {
                    debug!(client = %self.config.label, output = %spec.output, "removed stale result");
                }
                Err(e)
            }
        }
    }

    fn evaluate(&self, spec: &EfficiencySpec, store: &dyn HistogramStore) -> Result<EfficiencyResult, TnpError> {
        let folder = &self.config.root_folder;

        // Resolved first, so an unknown shape fails the same way whatever the store holds.
        let model: FitFunction = spec.bundle.fit_function.parse()?;

        let evaluation = {
            let numerator = store.get(folder, &spec.numerator).ok_or_else(|| TnpError::MissingHistogram {
                folder: folder.clone(),
                name: spec.numerator.clone(),
            })?;
            let denominator = store.get(folder, &spec.denominator).ok_or_else(|| TnpError::MissingHistogram {
                folder: folder.clone(),
                name: spec.denominator.clone(),
            })?;
            evaluate_efficiency(spec, model, numerator, denominator, &self.fit_options)?
        };

        if self.config.verbose {
            self.log_fit_reports(spec, &evaluation);
        }
        if let Some(dir) = &self.config.plot_dump_path {
            if let Err(e) = self.dump_plots(dir, spec, &evaluation) {
                warn!(client = %self.config.label, output = %spec.output, "plot dump failed: {e}");
            }
        }

        let result = evaluation.into_result(spec)?;
        let failed = result.failed_count();
        if failed > 0 {
            warn!(
                client = %self.config.label,
                output = %spec.output,
                "{failed} of {} slices have no efficiency",
                result.bins.len()
            );
        }
        Ok(result)
    }

    fn log_fit_reports(&self, spec: &EfficiencySpec, evaluation: &Evaluation) {
        for slice in &evaluation.slices {
            let report = format_slice_report(spec, evaluation.model, slice);
            info!(client = %self.config.label, "\n{report}");
        }
    }

    fn dump_plots(&self, dir: &Path, spec: &EfficiencySpec, evaluation: &Evaluation) -> Result<(), TnpError> {
        let mut panels = Vec::new();
        for slice in &evaluation.slices {
            let Ok(fit) = &slice.outcome else {
                continue;
            };
            let label = if evaluation.variable_axis.is_some() {
                format!(" [{:.3}, {:.3})", slice.low, slice.high)
            } else {
                String::new()
            };
            panels.push(OverlayPanel {
                title: format!("{}{label}", spec.denominator),
                fit: &fit.denominator,
            });
            panels.push(OverlayPanel {
                title: format!("{}{label}", spec.numerator),
                fit: &fit.numerator,
            });
        }
        let path = dir.join(format!("{}.svg", spec.output));
        write_fit_overlay(&path, &panels)?;
        debug!(path = %path.display(), panels = panels.len(), "wrote fit overlay");
        Ok(())
    }
}

impl ClientModule for TagAndProbeClient {
    fn label(&self) -> &str {
        &self.config.label
    }

    fn run(&mut self, store: &mut dyn HistogramStore) -> Result<ClientSummary, TnpError> {
        let mut summary = ClientSummary::default();

        if let Some(dir) = &self.config.plot_dump_path {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!(client = %self.config.label, "cannot create plot directory {}: {e}", dir.display());
            }
        }

        for spec in &self.config.efficiencies {
            match self.process(spec, store) {
                Ok(()) => {
                    debug!(client = %self.config.label, output = %spec.output, "efficiency written");
                    summary.written.push(spec.output.clone());
                }
                Err(e) => {
                    if self.config.verbose {
                        warn!(
                            client = %self.config.label,
                            output = %spec.output,
                            numerator = %spec.numerator,
                            denominator = %spec.denominator,
                            bundle = ?spec.bundle,
                            "skipping efficiency: {e}"
                        );
                    } else {
                        warn!(client = %self.config.label, output = %spec.output, "skipping efficiency: {e}");
                    }
                    summary.failed.push((spec.output.clone(), e.to_string()));
                }
            }
        }

        if summary.written.is_empty() && !summary.failed.is_empty() {
            return Err(TnpError::ClientFailed {
                label: self.config.label.clone(),
                failed: summary.failed.len(),
            });
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Axis, Histogram, ParameterBundle};
    use crate::store::MemoryStore;

    fn bundle_1d() -> ParameterBundle {
        ParameterBundle {
            mass_dimension: 1,
            ..ParameterBundle::default()
        }
    }

    fn flat(entries: f64) -> Histogram {
        Histogram::from_contents(Axis::new(50, 65.0, 115.0).unwrap(), vec![entries / 50.0; 50]).unwrap()
    }

    fn spec(numerator: &str, denominator: &str, output: &str) -> EfficiencySpec {
        EfficiencySpec {
            numerator: numerator.to_string(),
            denominator: denominator.to_string(),
            output: output.to_string(),
            bundle: bundle_1d(),
        }
    }

    fn client(efficiencies: Vec<EfficiencySpec>) -> TagAndProbeClient {
        TagAndProbeClient::new(ClientConfig {
            label: "tnp".to_string(),
            root_folder: "HLT/EG".to_string(),
            verbose: true,
            plot_dump_path: None,
            efficiencies,
        })
    }

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.insert_histogram("HLT/EG/", "tracks", flat(1000.0));
        store.insert_histogram("HLT/EG/", "TightIDElectrons", flat(750.0));
        store
    }

    #[test]
    fn flat_histograms_give_three_quarters() {
        let mut store = store();
        let mut c = client(vec![spec("TightIDElectrons", "tracks", "effTight")]);
        let summary = c.run(&mut store).unwrap();
        assert_eq!(summary.written, ["effTight"]);

        let result = store.result("HLT/EG", "effTight").unwrap();
        let v = result.bins[0].value.as_ref().unwrap();
        assert!((v.efficiency - 0.75).abs() < 1e-9);
        assert!((v.error - (0.75_f64 * 0.25 / 400.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn missing_numerator_skips_only_that_spec() {
        let mut store = store();
        let mut c = client(vec![
            spec("LooseIDElectrons", "tracks", "effLoose"),
            spec("TightIDElectrons", "tracks", "effTight"),
        ]);

        let err = c.process(&c.config().efficiencies[0].clone(), &mut store).unwrap_err();
        assert!(matches!(err, TnpError::MissingHistogram { ref name, .. } if name == "LooseIDElectrons"));

        let summary = c.run(&mut store).unwrap();
        assert_eq!(summary.written, ["effTight"]);
        assert_eq!(summary.failed.len(), 1);
        assert!(store.result("HLT/EG", "effLoose").is_none());
        assert!(store.result("HLT/EG", "effTight").is_some());
    }

    #[test]
    fn unknown_fit_function_fails_regardless_of_histograms() {
        let mut bad = spec("nothing", "nowhere", "effBad");
        bad.bundle.fit_function = "CrystalBall".to_string();
        let c = client(vec![bad.clone()]);

        // Histograms absent.
        let mut empty = MemoryStore::new();
        let err = c.process(&bad, &mut empty).unwrap_err();
        assert!(matches!(err, TnpError::UnsupportedFitModel(ref n) if n == "CrystalBall"));

        // Histograms present.
        let mut full = store();
        bad.numerator = "TightIDElectrons".to_string();
        bad.denominator = "tracks".to_string();
        let err = c.process(&bad, &mut full).unwrap_err();
        assert!(matches!(err, TnpError::UnsupportedFitModel(_)));
        assert!(full.results.is_empty());
    }

    #[test]
    fn failed_rerun_removes_previous_result() {
        let mut store = store();
        let mut c = client(vec![spec("TightIDElectrons", "tracks", "effTight")]);
        c.run(&mut store).unwrap();
        assert!(store.result("HLT/EG", "effTight").is_some());

        store.histograms.remove("HLT/EG/TightIDElectrons");
        let err = c.run(&mut store).unwrap_err();
        assert!(matches!(err, TnpError::ClientFailed { failed: 1, .. }));
        assert!(store.result("HLT/EG", "effTight").is_none());
    }

    #[test]
    fn fit_failure_skips_only_that_spec() {
        let mut store = store();
        // Four mass bins cannot constrain five parameters.
        let coarse = Axis::new(4, 65.0, 115.0).unwrap();
        store.insert_histogram("HLT/EG", "coarsePass", Histogram::from_contents(coarse, vec![150.0; 4]).unwrap());
        store.insert_histogram("HLT/EG", "coarseAll", Histogram::from_contents(coarse, vec![200.0; 4]).unwrap());

        let mut c = client(vec![
            spec("coarsePass", "coarseAll", "effCoarse"),
            spec("TightIDElectrons", "tracks", "effTight"),
        ]);

        let err = c.process(&c.config().efficiencies[0].clone(), &mut store).unwrap_err();
        assert!(matches!(err, TnpError::FitConvergence { .. }));

        let summary = c.run(&mut store).unwrap();
        assert_eq!(summary.written, ["effTight"]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "effCoarse");
        assert!(store.result("HLT/EG", "effCoarse").is_none());
        assert!(store.result("HLT/EG", "effTight").is_some());
    }

    #[test]
    fn all_specs_failing_fails_the_client() {
        let mut store = MemoryStore::new();
        let mut c = client(vec![spec("a", "b", "effA"), spec("c", "d", "effC")]);
        let err = c.run(&mut store).unwrap_err();
        assert!(matches!(err, TnpError::ClientFailed { failed: 2, .. }));
    }

    #[test]
    fn empty_client_succeeds_with_nothing_written() {
        let mut store = store();
        let mut c = client(Vec::new());
        let summary = c.run(&mut store).unwrap();
        assert!(summary.written.is_empty());
        assert!(summary.failed.is_empty());
    }

    #[test]
    fn plot_dump_writes_one_file_per_efficiency() {
        let dir = tempfile::tempdir().unwrap();
        let plots = dir.path().join("fitting-plots");
        let mut c = TagAndProbeClient::new(ClientConfig {
            label: "tnp".to_string(),
            root_folder: "HLT/EG".to_string(),
            verbose: false,
            plot_dump_path: Some(plots.clone()),
            efficiencies: vec![spec("TightIDElectrons", "tracks", "effTight")],
        });
        let mut store = store();
        c.run(&mut store).unwrap();
        assert!(plots.join("effTight.svg").is_file());
    }
}
