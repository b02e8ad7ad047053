//! Domain types used throughout the client.
//!
//! This module defines:
//!
//! - fit configuration (`ParameterBundle`, `BundleOverrides`, `FitFunction`)
//! - client configuration (`EfficiencySpec`, `ClientConfig`)
//! - histograms (`Axis`, `Histogram`)
//! - derived outputs (`EfficiencyResult` and its parts)

pub mod histogram;
pub mod types;

pub use histogram::*;
pub use types::*;
