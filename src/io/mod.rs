//! Input/output helpers: histogram store JSON files.

pub mod store_file;

pub use store_file::*;
