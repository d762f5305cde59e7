//! Kensa CLI: run scenario suites against gacha and diagnose content
//!
//! ## Usage
//!
//! ```bash
//! kensa run                         # Run every scenario in scenarios/scenarios.yaml
//! kensa run --filter g1 --headless  # One scenario, no window
//! kensa validate -s my.yaml         # Check a scenario file
//! kensa list --format json          # List scenarios
//! ```

use clap::Parser;
use kensa_cli::{
    listing, load, select, Cli, CliResult, ColorChoice, Commands, ListArgs, LogFormat, ProgressReporter, RunArgs,
    SuiteRunner, ValidateArgs, Verbosity,
};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let verbosity = Verbosity::from_flags(cli.quiet, cli.verbose);
    init_tracing(verbosity, cli.log_format);
    let color: ColorChoice = cli.color.clone().into();
    let reporter = ProgressReporter::new(color.should_color(), verbosity.is_quiet());

    match cli.command {
        Commands::Run(args) => run_scenarios(&args, reporter),
        Commands::Validate(args) => run_validate(&args, &reporter),
        Commands::List(args) => run_list(&args),
    }
}

fn init_tracing(verbosity: Verbosity, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.log_level()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn run_validate(args: &ValidateArgs, reporter: &ProgressReporter) -> CliResult<()> {
    let scenarios = load(&args.scenarios)?;
    reporter.success(&format!(
        "{}: {} scenarios valid",
        args.scenarios.display(),
        scenarios.len()
    ));
    Ok(())
}

fn run_list(args: &ListArgs) -> CliResult<()> {
    let scenarios = select(load(&args.scenarios)?, args.filter.as_deref());
    println!("{}", listing(&scenarios, args.format)?);
    Ok(())
}

#[cfg(feature = "browser")]
fn run_scenarios(args: &RunArgs, reporter: ProgressReporter) -> CliResult<()> {
    let settings = args.settings();
    let scenarios = select(load(&args.scenarios)?, args.filter.as_deref());
    if scenarios.is_empty() {
        reporter.info("No scenarios matched");
        return Ok(());
    }
    tracing::info!(count = scenarios.len(), headless = settings.headless, ci = settings.ci, "starting run");

    let factory = kensa::CdpSessionFactory::new(settings.cdp_options());
    let mut runner = SuiteRunner::new(settings.harness_config(), reporter);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let suite = runtime.block_on(runner.run(&factory, &scenarios));
    runner.conclude(&suite, &args.report_path(&settings))
}

#[cfg(not(feature = "browser"))]
fn run_scenarios(_args: &RunArgs, _reporter: ProgressReporter) -> CliResult<()> {
    Err(kensa_cli::CliError::config(
        "browser support not enabled. Rebuild with --features browser",
    ))
}
