//! Mathematical utilities: peak kernels, integration and least squares.

pub mod integrate;
pub mod ols;
pub mod shapes;

pub use integrate::*;
pub use ols::*;
pub use shapes::*;
