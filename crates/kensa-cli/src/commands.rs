//! CLI command definitions using clap

use crate::config::{is_ci, ColorChoice, RunSettings};
use clap::builder::BoolishValueParser;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Default scenario file
pub const DEFAULT_SCENARIOS: &str = "scenarios/scenarios.yaml";

/// Kensa: end-to-end verification of gacha and diagnose content
#[derive(Parser, Debug)]
#[command(name = "kensa")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Log output format
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run scenarios against the live content
    Run(RunArgs),

    /// Check a scenario file without opening a browser
    Validate(ValidateArgs),

    /// List scenarios in a scenario file
    List(ListArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Scenario file (YAML list)
    #[arg(short, long, env = "KENSA_SCENARIOS", default_value = DEFAULT_SCENARIOS)]
    pub scenarios: PathBuf,

    /// Only run scenarios whose id or name contains this text
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Artifact, trace and report directory
    #[arg(short, long, env = "KENSA_ARTIFACT_DIR", default_value = kensa::DEFAULT_ARTIFACT_DIR)]
    pub artifact_dir: PathBuf,

    /// Report file (defaults to <artifact-dir>/report.json)
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Run Chromium headless (defaults to true under CI)
    #[arg(
        long,
        env = "KENSA_HEADLESS",
        value_parser = BoolishValueParser::new(),
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub headless: Option<bool>,

    /// Chromium binary
    #[arg(long, env = "KENSA_CHROME_PATH")]
    pub chrome_path: Option<PathBuf>,

    /// Parent directory for per-scenario browser profiles
    #[arg(long, env = "KENSA_PROFILE_DIR")]
    pub profile_dir: Option<PathBuf>,

    /// Per-action timeout in milliseconds
    #[arg(long, env = "KENSA_TIMEOUT_MS", default_value = "30000")]
    pub timeout_ms: u64,

    /// Navigation timeout in milliseconds
    #[arg(long, env = "KENSA_NAV_TIMEOUT_MS", default_value = "45000")]
    pub nav_timeout_ms: u64,

    /// Delay before each browser action in milliseconds
    #[arg(long, env = "KENSA_SLOWMO_MS", default_value = "0")]
    pub slowmo_ms: u64,

    /// Pause between visual steps in milliseconds (ignored under CI)
    #[arg(long, env = "KENSA_DEMO_WAIT_MS", default_value = "0")]
    pub demo_wait_ms: u64,
}

impl RunArgs {
    /// Resolve arguments and environment into run settings
    #[must_use]
    pub fn settings(&self) -> RunSettings {
        let ci = is_ci();
        RunSettings {
            artifact_dir: self.artifact_dir.clone(),
            headless: self.headless.unwrap_or(ci),
            chrome_path: self.chrome_path.clone(),
            profile_dir: self.profile_dir.clone(),
            timeout_ms: self.timeout_ms,
            nav_timeout_ms: self.nav_timeout_ms,
            slowmo_ms: self.slowmo_ms,
            demo_wait_ms: self.demo_wait_ms,
            ci,
        }
    }

    /// Report location
    #[must_use]
    pub fn report_path(&self, settings: &RunSettings) -> PathBuf {
        self.report.clone().unwrap_or_else(|| settings.report_path())
    }
}

/// Arguments for the validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Scenario file (YAML list)
    #[arg(short, long, env = "KENSA_SCENARIOS", default_value = DEFAULT_SCENARIOS)]
    pub scenarios: PathBuf,
}

/// Arguments for the list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Scenario file (YAML list)
    #[arg(short, long, env = "KENSA_SCENARIOS", default_value = DEFAULT_SCENARIOS)]
    pub scenarios: PathBuf,

    /// Only list scenarios whose id or name contains this text
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Output format
    #[arg(long, default_value = "text")]
    pub format: ListFormat,
}

/// Listing format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ListFormat {
    /// One line per scenario
    #[default]
    Text,
    /// JSON array
    Json,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Color argument
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Auto-detect
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_parses_flags() {
        let cli = Cli::parse_from([
            "kensa",
            "run",
            "--scenarios",
            "s.yaml",
            "--filter",
            "g1",
            "--headless",
            "--timeout-ms",
            "1000",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.scenarios, PathBuf::from("s.yaml"));
        assert_eq!(args.filter.as_deref(), Some("g1"));
        assert_eq!(args.headless, Some(true));
        assert_eq!(args.settings().timeout_ms, 1000);
    }

    #[test]
    fn test_headless_false_value() {
        let cli = Cli::parse_from(["kensa", "run", "--headless", "false"]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.headless, Some(false));
        assert!(!args.settings().headless);
    }

    #[test]
    fn test_report_defaults_into_artifact_dir() {
        let cli = Cli::parse_from(["kensa", "run", "--artifact-dir", "out"]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let settings = args.settings();
        assert_eq!(args.report_path(&settings), PathBuf::from("out/report.json"));
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["kensa", "-vv", "--log-format", "json", "list"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(matches!(cli.command, Commands::List(_)));
    }

    #[test]
    fn test_color_conversion() {
        assert_eq!(ColorChoice::from(ColorArg::Never), ColorChoice::Never);
        assert_eq!(ColorChoice::from(ColorArg::Always), ColorChoice::Always);
    }
}
