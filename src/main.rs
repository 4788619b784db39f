use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use tractcrop::cli::{Cli, Commands, PreprocessArgs, SelectConfigArgs};
use tractcrop::config::SystemConfig;
use tractcrop::preprocess;

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Preprocess(args) => run_preprocess(&args),
        Commands::SelectConfig(args) => Ok(run_select_config(&args)),
        Commands::ShowConfig => {
            let system = SystemConfig::load().context("failed to resolve system configuration")?;
            println!("{system}");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_preprocess(args: &PreprocessArgs) -> Result<ExitCode> {
    let system = SystemConfig::load().context("failed to resolve system configuration")?;
    let config = args
        .to_config(&system)
        .context("invalid preprocessing arguments")?;

    let subjects = if args.subjects.is_empty() {
        preprocess::discover_subjects(&config.source_root)?
    } else {
        args.subjects.clone()
    };
    if subjects.is_empty() {
        anyhow::bail!("no subjects found in {}", config.source_root.display());
    }

    let report = preprocess::run(&config, &subjects)?;
    for failure in &report.failed {
        eprintln!("FAILED {failure}");
    }
    println!(
        "{} of {} subjects cropped into {}",
        report.succeeded.len(),
        report.total(),
        config.target_root.display()
    );

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn run_select_config(args: &SelectConfigArgs) -> ExitCode {
    match args.to_experiment().select() {
        Ok(id) => {
            println!("{id}");
            ExitCode::SUCCESS
        }
        Err(unsupported) => {
            eprintln!("ERROR: {}", unsupported.reason());
            ExitCode::FAILURE
        }
    }
}
