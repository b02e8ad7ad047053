//! Reporting: fit reports, efficiency tables and run summaries.

pub mod format;

pub use format::*;
