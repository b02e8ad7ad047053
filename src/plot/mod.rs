//! Fit-overlay rendering.

pub mod svg;

pub use svg::*;
