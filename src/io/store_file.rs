//! Read/write histogram store JSON files.
//!
//! A store file holds input histograms and, after a run, the derived
//! efficiency results, both keyed by `"<folder>/<name>"`.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{EfficiencyResult, Histogram};
use crate::error::AppError;
use crate::store::MemoryStore;

pub const TOOL_NAME: &str = "tnp";

/// On-disk form of a [`MemoryStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreFile {
    #[serde(default)]
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub histograms: BTreeMap<String, Histogram>,
    #[serde(default)]
    pub results: BTreeMap<String, EfficiencyResult>,
}

impl From<StoreFile> for MemoryStore {
    fn from(file: StoreFile) -> Self {
        MemoryStore {
            histograms: file.histograms,
            results: file.results,
        }
    }
}

/// Read a store JSON file.
///
/// Every histogram must have valid axes and matching contents.
pub fn read_store(path: &Path) -> Result<MemoryStore, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open store file '{}': {e}", path.display())))?;
    let parsed: StoreFile = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::new(2, format!("Invalid store file '{}': {e}", path.display())))?;

    for (key, h) in &parsed.histograms {
        h.validate().map_err(|e| {
            AppError::new(2, format!("Invalid histogram '{key}' in store file '{}': {e}", path.display()))
        })?;
    }
    if !parsed.results.is_empty() {
        warn!(
            results = parsed.results.len(),
            "store file carries results from an earlier run; failed outputs will be removed"
        );
    }
    debug!(
        path = %path.display(),
        histograms = parsed.histograms.len(),
        results = parsed.results.len(),
        "store file loaded"
    );
    Ok(parsed.into())
}

/// Write `store` to a JSON file, stamped with the current time.
pub fn write_store(path: &Path, store: &MemoryStore) -> Result<(), AppError> {
    let out = StoreFile {
        tool: TOOL_NAME.to_string(),
        generated_at: Some(Utc::now()),
        histograms: store.histograms.clone(),
        results: store.results.clone(),
    };

    let file = File::create(path)
        .map_err(|e| AppError::new(4, format!("Failed to create store file '{}': {e}", path.display())))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &out)
        .map_err(|e| AppError::new(4, format!("Failed to write store file: {e}")))?;
    writer
        .flush()
        .map_err(|e| AppError::new(4, format!("Failed to write store file: {e}")))?;
    Ok(())
}
