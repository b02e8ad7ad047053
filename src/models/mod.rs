//! Fit catalog model implementations.
//!
//! Models are implemented as small, pure functions so that the minimizer can
//! stay generic over the catalog.

pub mod model;

pub use model::*;
