//! `tnp-efficiency` library crate.
//!
//! Tag-and-probe efficiency fits hosted in a sequential DQM client runner.
//! The binary (`tnp`) is a thin wrapper around this library so that the
//! fitting and sequencing logic is testable without spawning processes.

pub mod app;
pub mod cli;
pub mod client;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
pub mod sequence;
pub mod store;
