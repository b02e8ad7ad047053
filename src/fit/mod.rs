//! Curve fitting and efficiency evaluation.
//!
//! Responsibilities:
//!
//! - fit one mass spectrum with a catalog shape (Levenberg–Marquardt)
//! - evaluate an efficiency slice by slice from two fitted spectra

pub mod efficiency;
pub mod fitter;

pub use efficiency::*;
pub use fitter::*;
