//! Ordered execution of client modules.
//!
//! A sequence is a fixed list of typed modules run one after another against
//! a shared store. Modules exchange data only through that store. Each module's
//! `Result` is captured; a failing module never stops the modules after it.

use tracing::{error, info, warn};

use crate::error::TnpError;
use crate::store::HistogramStore;

/// Module identifiers of the HLT offline client sequence, in execution order.
pub const HLT_OFFLINE_CLIENT_SEQUENCE: [&str; 10] = [
    "egHLTOffDQMClient",
    "hltMuonPostVal",
    "hltElectronPostVal",
    "jetMETHLTOfflineClient",
    "fsqClient",
    "HiJetClient",
    "HLTTauPostSeq",
    "dqmOfflineHLTCert",
    "hltInclusiveVBFClient",
    "exoticaClient",
];

/// What a module published during its run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientSummary {
    pub written: Vec<String>,
    /// `(output name, reason)` of skipped outputs.
    pub failed: Vec<(String, String)>,
}

/// A post-processing step that reads from and publishes to the store.
pub trait ClientModule {
    fn label(&self) -> &str;
    fn run(&mut self, store: &mut dyn HistogramStore) -> Result<ClientSummary, TnpError>;
}

/// Placeholder for a module that is declared but not implemented here.
#[derive(Debug, Clone)]
pub struct ExternalClient {
    label: String,
}

impl ExternalClient {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into() }
    }
}

impl ClientModule for ExternalClient {
    fn label(&self) -> &str {
        &self.label
    }

    fn run(&mut self, _store: &mut dyn HistogramStore) -> Result<ClientSummary, TnpError> {
        Err(TnpError::ModuleUnavailable(self.label.clone()))
    }
}

/// An ordered list of modules.
#[derive(Default)]
pub struct Sequence {
    modules: Vec<Box<dyn ClientModule>>,
}

impl Sequence {
    pub fn new(modules: Vec<Box<dyn ClientModule>>) -> Self {
        Self { modules }
    }

    /// Build a sequence from labels, taking modules out of `available` by label.
    ///
    /// Labels with no matching module become [`ExternalClient`] placeholders.
    /// Modules that no label asked for are returned unused.
    pub fn from_labels(
        labels: &[String],
        mut available: Vec<Box<dyn ClientModule>>,
    ) -> (Self, Vec<Box<dyn ClientModule>>) {
        let mut modules: Vec<Box<dyn ClientModule>> = Vec::with_capacity(labels.len());
        for label in labels {
            match available.iter().position(|m| m.label() == label) {
                Some(i) => modules.push(available.remove(i)),
                None => modules.push(Box::new(ExternalClient::new(label.clone()))),
            }
        }
        (Self { modules }, available)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.label()).collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Result of one module run.
#[derive(Debug)]
pub struct ModuleOutcome {
    pub label: String,
    pub result: Result<ClientSummary, TnpError>,
}

/// Outcomes of a whole pass, in execution order.
#[derive(Debug, Default)]
pub struct SequenceReport {
    pub outcomes: Vec<ModuleOutcome>,
}

impl SequenceReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Run every module of `sequence` in order against `store`.
pub fn run_sequence(sequence: &mut Sequence, store: &mut dyn HistogramStore) -> SequenceReport {
    let mut report = SequenceReport::default();
    let total = sequence.modules.len();

    for (i, module) in sequence.modules.iter_mut().enumerate() {
        let label = module.label().to_string();
        info!(module = %label, "running module {}/{total}", i + 1);

        let result = module.run(store);
        match &result {
            Ok(summary) if summary.failed.is_empty() => {
                info!(module = %label, written = summary.written.len(), "module finished");
            }
            Ok(summary) => {
                warn!(
                    module = %label,
                    written = summary.written.len(),
                    skipped = summary.failed.len(),
                    "module finished with skipped outputs"
                );
            }
            Err(e @ TnpError::ModuleUnavailable(_)) => {
                warn!(module = %label, "{e}");
            }
            Err(e) => {
                error!(module = %label, "module failed: {e}");
            }
        }
        report.outcomes.push(ModuleOutcome { label, result });
    }

    report
}
