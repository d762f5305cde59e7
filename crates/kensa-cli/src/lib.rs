//! Kensa CLI Library
//!
//! Command-line interface for running scenario suites with Kensa.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // Error types are self-documenting

mod commands;
mod config;
mod error;
mod output;
mod runner;

pub use commands::{
    Cli, ColorArg, Commands, ListArgs, ListFormat, LogFormat, RunArgs, ValidateArgs, DEFAULT_SCENARIOS,
};
pub use config::{is_ci, is_ci_value, ColorChoice, RunSettings, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{scenario_line, ProgressReporter};
pub use runner::{listing, load, select, SuiteRunner};
