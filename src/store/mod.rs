//! Histogram store interface and an in-memory implementation.
//!
//! Clients never talk to each other directly; everything they consume and
//! publish goes through a store addressed by `(folder, name)`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{EfficiencyResult, Histogram, normalize_folder};

/// The store operations a client module may use.
pub trait HistogramStore {
    fn get(&self, folder: &str, name: &str) -> Option<&Histogram>;
    fn put(&mut self, folder: &str, name: &str, result: EfficiencyResult);
    /// Drop a derived result, returning whether one was present.
    fn remove(&mut self, folder: &str, name: &str) -> bool;
}

/// `"<folder>/<name>"` with the folder normalized.
pub fn store_key(folder: &str, name: &str) -> String {
    let folder = normalize_folder(folder);
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{folder}/{name}")
    }
}

/// Histograms and derived results kept in ordered maps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStore {
    #[serde(default)]
    pub histograms: BTreeMap<String, Histogram>,
    #[serde(default)]
    pub results: BTreeMap<String, EfficiencyResult>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_histogram(&mut self, folder: &str, name: &str, histogram: Histogram) {
        self.histograms.insert(store_key(folder, name), histogram);
    }

    pub fn result(&self, folder: &str, name: &str) -> Option<&EfficiencyResult> {
        self.results.get(&store_key(folder, name))
    }
}

impl HistogramStore for MemoryStore {
    fn get(&self, folder: &str, name: &str) -> Option<&Histogram> {
        self.histograms.get(&store_key(folder, name))
    }

    fn put(&mut self, folder: &str, name: &str, result: EfficiencyResult) {
        self.results.insert(store_key(folder, name), result);
    }

    fn remove(&mut self, folder: &str, name: &str) -> bool {
        self.results.remove(&store_key(folder, name)).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Axis, FitFunction};

    #[test]
    fn keys_ignore_folder_slashes() {
        assert_eq!(store_key("HLT/EG/", "tracks"), "HLT/EG/tracks");
        assert_eq!(store_key("/HLT/EG", "tracks"), "HLT/EG/tracks");
        assert_eq!(store_key("", "tracks"), "tracks");
    }

    #[test]
    fn get_and_put_are_folder_scoped() {
        let mut store = MemoryStore::new();
        let h = Histogram::new_1d(Axis::new(10, 0.0, 1.0).unwrap());
        store.insert_histogram("HLT/EG/", "tracks", h.clone());

        assert_eq!(store.get("HLT/EG", "tracks"), Some(&h));
        assert!(store.get("HLT/Muon", "tracks").is_none());

        let result = EfficiencyResult {
            name: "effTight".to_string(),
            numerator: "TightIDElectrons".to_string(),
            denominator: "tracks".to_string(),
            fit_function: FitFunction::GaussianPlusLinear,
            variable_axis: None,
            bins: Vec::new(),
        };
        store.put("HLT/EG/", "effTight", result.clone());
        assert_eq!(store.result("HLT/EG", "effTight"), Some(&result));
        assert!(store.result("HLT/EG", "effLoose").is_none());

        assert!(store.remove("/HLT/EG", "effTight"));
        assert!(store.result("HLT/EG", "effTight").is_none());
        assert!(!store.remove("HLT/EG", "effTight"));
    }
}
