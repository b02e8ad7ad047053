//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the real entry point that:
//! - parses CLI arguments and installs logging
//! - loads the run configuration (file, `$TNP_CONFIG`, or built-in)
//! - runs the client sequence and prints reports
//! - writes the resulting store

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;
use tracing::{Level, debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::cli::{Cli, Command, DemoArgs, RunArgs};
use crate::config::{CONFIG_ENV, RunConfig};
use crate::error::AppError;
use crate::report::{format_result_table, format_run_summary};
use crate::sequence::HLT_OFFLINE_CLIENT_SEQUENCE;
use crate::store::MemoryStore;

pub mod pipeline;

/// Entry point for the `tnp` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Demo(args) => handle_demo(args),
        Command::Config => handle_config(),
        Command::Sequence => {
            for (i, label) in HLT_OFFLINE_CLIENT_SEQUENCE.iter().enumerate() {
                println!("{:>2}. {label}", i + 1);
            }
            Ok(())
        }
    }
}

fn setup_logging(verbose: bool) -> Result<(), AppError> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::new(4, format!("Failed to install log subscriber: {e}")))
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let config = match config_path(args.config, std::env::var_os(CONFIG_ENV)) {
        Some(path) => {
            info!(path = %path.display(), "loading configuration");
            RunConfig::from_file(&path)?
        }
        None => {
            debug!("no configuration given, using the built-in one");
            RunConfig::builtin()
        }
    };

    let store = crate::io::read_store(&args.input)?;
    let out = pipeline::run_pipeline(&config, store);
    print_outcome(&out.report, &out.store);

    if let Some(path) = &args.output {
        crate::io::write_store(path, &out.store)?;
        info!(path = %path.display(), "store written");
    }
    out.check()
}

fn handle_demo(args: DemoArgs) -> Result<(), AppError> {
    let mut config = RunConfig::builtin();
    if let Some(dir) = &args.plots {
        for client in &mut config.clients {
            client.plot_dump_path = Some(dir.clone());
        }
    }

    let sample = pipeline::demo_sample_config(args.seed, args.probes, args.efficiency)?;
    let (store, data) = pipeline::demo_store(&config, &sample)?;
    let out = pipeline::run_pipeline(&config, store);
    print_outcome(&out.report, &out.store);

    let truth: Vec<String> = data.true_efficiency.iter().map(|e| format!("{e:.4}")).collect();
    println!("generated signal efficiency per slice: [{}]", truth.join(", "));

    if let Some(path) = &args.output {
        crate::io::write_store(path, &out.store)?;
        info!(path = %path.display(), "store written");
    }
    out.check()
}

fn handle_config() -> Result<(), AppError> {
    let text = RunConfig::builtin().to_toml_string()?;
    print!("{text}");
    Ok(())
}

fn print_outcome(report: &crate::sequence::SequenceReport, store: &MemoryStore) {
    println!("{}", format_run_summary(report));
    for result in store.results.values() {
        println!("{}", format_result_table(result));
    }
}

/// An explicit `--config` wins over `$TNP_CONFIG`.
fn config_path(arg: Option<PathBuf>, env: Option<OsString>) -> Option<PathBuf> {
    arg.or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from))
}
