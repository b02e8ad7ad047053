//! Command-line parsing for the tag-and-probe efficiency runner.
//!
//! Argument parsing and command dispatch stay separate from the fitting code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "tnp", version, about = "Tag-and-probe efficiency fits for DQM client sequences")]
pub struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the configured client sequence on a histogram store file.
    Run(RunArgs),
    /// Generate synthetic tag-and-probe histograms and run the built-in configuration.
    Demo(DemoArgs),
    /// Print the built-in configuration as TOML.
    Config,
    /// Print the HLT offline client sequence.
    Sequence,
}

#[derive(Debug, Parser, Clone)]
pub struct RunArgs {
    /// Store JSON file holding the input histograms.
    #[arg(short, long, value_name = "JSON")]
    pub input: PathBuf,

    /// TOML run configuration (defaults to $TNP_CONFIG, then the built-in one).
    #[arg(short, long, value_name = "TOML")]
    pub config: Option<PathBuf>,

    /// Write the store, including derived efficiencies, to this file.
    #[arg(short, long, value_name = "JSON")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct DemoArgs {
    /// Random seed for sample generation.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Probes generated per probe-variable bin.
    #[arg(long, default_value_t = 5000)]
    pub probes: usize,

    /// Signal efficiency at eta = 0.
    #[arg(long, default_value_t = 0.85)]
    pub efficiency: f64,

    /// Write the resulting store to this file.
    #[arg(short, long, value_name = "JSON")]
    pub output: Option<PathBuf>,

    /// Dump SVG fit overlays into this directory.
    #[arg(long, value_name = "DIR")]
    pub plots: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_arguments_parse() {
        let cli = Cli::parse_from(["tnp", "-v", "run", "--input", "in.json", "--output", "out.json"]);
        assert!(cli.verbose);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.input, PathBuf::from("in.json"));
                assert_eq!(args.output, Some(PathBuf::from("out.json")));
                assert!(args.config.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn demo_defaults() {
        let cli = Cli::parse_from(["tnp", "demo"]);
        match cli.command {
            Command::Demo(args) => {
                assert_eq!(args.seed, 42);
                assert_eq!(args.probes, 5000);
                assert!((args.efficiency - 0.85).abs() < 1e-12);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
