//! Suite execution and scenario listing

use crate::commands::ListFormat;
use crate::error::{CliError, CliResult};
use crate::output::{scenario_line, ProgressReporter};
use kensa::{HarnessConfig, Scenario, SessionFactory, SuiteReport};
use serde::Serialize;
use std::path::Path;

/// Scenarios whose id or name contains `filter`, in file order
#[must_use]
pub fn select(scenarios: Vec<Scenario>, filter: Option<&str>) -> Vec<Scenario> {
    match filter {
        None => scenarios,
        Some(pattern) => scenarios
            .into_iter()
            .filter(|s| s.id.contains(pattern) || s.name.contains(pattern))
            .collect(),
    }
}

/// Load a scenario file; any malformed record fails the whole file
pub fn load(path: &Path) -> CliResult<Vec<Scenario>> {
    Ok(kensa::load_scenarios(path)?)
}

#[derive(Serialize)]
struct ListEntry<'a> {
    id: &'a str,
    name: &'a str,
    content_type: String,
    lead_type: String,
    draw_count: Option<u32>,
    url: &'a str,
}

/// Render a scenario listing
pub fn listing(scenarios: &[Scenario], format: ListFormat) -> CliResult<String> {
    match format {
        ListFormat::Text => Ok(scenarios
            .iter()
            .map(scenario_line)
            .collect::<Vec<_>>()
            .join("\n")),
        ListFormat::Json => {
            let entries: Vec<ListEntry<'_>> = scenarios
                .iter()
                .map(|s| ListEntry {
                    id: &s.id,
                    name: &s.name,
                    content_type: s.content_type.to_string(),
                    lead_type: s.lead_type.to_string(),
                    draw_count: s.draw_count,
                    url: &s.url,
                })
                .collect();
            Ok(serde_json::to_string_pretty(&entries)?)
        }
    }
}

/// Runs scenarios one by one and reports progress
#[derive(Debug)]
pub struct SuiteRunner {
    config: HarnessConfig,
    reporter: ProgressReporter,
}

impl SuiteRunner {
    /// Create a runner
    #[must_use]
    pub const fn new(config: HarnessConfig, reporter: ProgressReporter) -> Self {
        Self { config, reporter }
    }

    /// Run every scenario in its own session
    pub async fn run(&mut self, factory: &dyn SessionFactory, scenarios: &[Scenario]) -> SuiteReport {
        let mut suite = SuiteReport::new();
        self.reporter.header("Kensa");
        self.reporter
            .start_progress(scenarios.len() as u64, "Running scenarios");
        for scenario in scenarios {
            self.reporter.set_message(&scenario.id);
            let report = kensa::run_scenario(factory, scenario, &self.config).await;
            self.reporter.scenario(&report);
            self.reporter.increment(1);
            suite.push(report);
        }
        self.reporter.finish();
        self.reporter.summary(&suite);
        suite
    }

    /// Write the report and turn failures into an error
    pub fn conclude(&self, suite: &SuiteReport, report_path: &Path) -> CliResult<()> {
        suite.save_json(report_path)?;
        self.reporter
            .info(&format!("Report written to {}", report_path.display()));
        if suite.all_passed() {
            Ok(())
        } else {
            Err(CliError::suite_failed(format!(
                "{} of {} scenarios did not pass",
                suite.failed() + suite.errored(),
                suite.total()
            )))
        }
    }
}
