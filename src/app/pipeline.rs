//! Shared run logic used by the `run` and `demo` commands.
//!
//! store -> sequence (configured clients + placeholders) -> report

use tracing::info;

use crate::config::RunConfig;
use crate::data::{SampleConfig, SampleData, generate_sample};
use crate::domain::{Axis, ClientConfig};
use crate::error::{AppError, TnpError};
use crate::sequence::{SequenceReport, run_sequence};
use crate::store::MemoryStore;

/// Everything a single pass produced.
#[derive(Debug)]
pub struct RunOutput {
    pub report: SequenceReport,
    pub store: MemoryStore,
}

impl RunOutput {
    /// Exit-code policy: a pass in which every module failed is an error.
    pub fn check(&self) -> Result<(), AppError> {
        if !self.report.outcomes.is_empty() && self.report.succeeded() == 0 {
            return Err(AppError::new(
                3,
                format!("all {} modules of the sequence failed", self.report.outcomes.len()),
            ));
        }
        Ok(())
    }
}

/// Run the configured sequence once over `store`.
pub fn run_pipeline(config: &RunConfig, mut store: MemoryStore) -> RunOutput {
    let mut sequence = config.build_sequence();
    info!(modules = sequence.len(), histograms = store.histograms.len(), "starting sequence");
    let report = run_sequence(&mut sequence, &mut store);
    RunOutput { report, store }
}

/// Demo inputs: a 2-D (mass x eta) sample filed under the first configured
/// client's folder and efficiency names.
pub fn demo_store(config: &RunConfig, sample: &SampleConfig) -> Result<(MemoryStore, SampleData), TnpError> {
    let data = generate_sample(sample)?;

    let mut store = MemoryStore::new();
    let fallback = ClientConfig::eg_default();
    let client = config.clients.first().unwrap_or(&fallback);
    for spec in &client.efficiencies {
        store.insert_histogram(&client.root_folder, &spec.numerator, data.numerator.clone());
        store.insert_histogram(&client.root_folder, &spec.denominator, data.denominator.clone());
    }
    Ok((store, data))
}

/// Sample settings for the demo: an eta-dependent efficiency over four bins.
pub fn demo_sample_config(seed: u64, probes: usize, efficiency: f64) -> Result<SampleConfig, TnpError> {
    Ok(SampleConfig {
        seed,
        probes,
        efficiency,
        efficiency_slope: 0.04,
        variable_axis: Some(Axis::new(4, -2.5, 2.5)?),
        ..SampleConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TnpError;
    use crate::sequence::ModuleOutcome;

    #[test]
    fn demo_recovers_generated_efficiency() {
        let config = RunConfig::builtin();
        let sample = demo_sample_config(11, 4000, 0.85).unwrap();
        let (store, data) = demo_store(&config, &sample).unwrap();

        let out = run_pipeline(&config, store);
        out.check().unwrap();
        assert_eq!(out.report.outcomes.len(), config.sequence.len());
        assert_eq!(out.report.succeeded(), 1);

        let result = out.store.result("HLT/EG", "effTight").unwrap();
        assert_eq!(result.bins.len(), 4);
        // The window yield includes the flat background that falls inside it.
        let background = 0.2 * (101.0 - 81.0) / (120.0 - 60.0);
        for (bin, truth) in result.bins.iter().zip(&data.true_efficiency) {
            let v = bin.value.as_ref().unwrap();
            let expected = (0.8 * truth + background * 0.85) / (0.8 + background);
            assert!(
                (v.efficiency - expected).abs() < 5.0 * v.error + 0.02,
                "eff {} vs {expected} (err {})",
                v.efficiency,
                v.error
            );
        }
    }

    #[test]
    fn all_modules_failing_maps_to_exit_code_three() {
        let out = RunOutput {
            report: SequenceReport {
                outcomes: vec![ModuleOutcome {
                    label: "hltMuonPostVal".to_string(),
                    result: Err(TnpError::ModuleUnavailable("hltMuonPostVal".to_string())),
                }],
            },
            store: MemoryStore::new(),
        };
        assert_eq!(out.check().unwrap_err().exit_code(), 3);

        let empty = RunOutput {
            report: SequenceReport::default(),
            store: MemoryStore::new(),
        };
        empty.check().unwrap();
    }
}
