//! Output formatting and progress reporting

use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use kensa::{RunOutcome, Scenario, ScenarioReport, SuiteReport};
use std::time::Duration;

/// Progress reporter for scenario runs
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: None,
            use_color,
            quiet,
        }
    }

    /// Start a progress bar over `total` scenarios
    pub fn start_progress(&mut self, total: u64, message: &str) {
        if self.quiet {
            return;
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(message.to_string());
        self.progress_bar = Some(pb);
    }

    /// Increment progress
    pub fn increment(&self, delta: u64) {
        if let Some(ref pb) = self.progress_bar {
            pb.inc(delta);
        }
    }

    /// Update progress message
    pub fn set_message(&self, message: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_message(message.to_string());
        }
    }

    /// Finish progress bar
    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_and_clear();
        }
    }

    fn line(&self, message: &str) {
        match self.progress_bar {
            Some(ref pb) => pb.suspend(|| {
                let _ = self.term.write_line(message);
            }),
            None => {
                let _ = self.term.write_line(message);
            }
        }
    }

    fn prefixed(&self, symbol: &str, plain: &str, color: fn(&str) -> String, message: &str) -> String {
        let prefix = if self.use_color {
            color(symbol)
        } else {
            plain.to_string()
        };
        format!("{prefix} {message}")
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.line(&self.prefixed("✓", "PASS", |s| style(s).green().bold().to_string(), message));
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        // Failures print even in quiet mode
        self.line(&self.prefixed("✗", "FAIL", |s| style(s).red().bold().to_string(), message));
    }

    /// Print a skip message
    pub fn skip(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.line(&self.prefixed("↷", "SKIP", |s| style(s).yellow().bold().to_string(), message));
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.line(&self.prefixed("ℹ", "INFO", |s| style(s).blue().bold().to_string(), message));
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }

        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };

        self.line("");
        self.line(&styled);
    }

    /// Print one scenario outcome
    pub fn scenario(&self, report: &ScenarioReport) {
        let label = format!("{} ({})", report.id, report.name);
        match &report.outcome {
            RunOutcome::Passed => self.success(&label),
            RunOutcome::Skipped { reason } => self.skip(&format!("{label}: {reason}")),
            RunOutcome::Failed {
                condition: Some(condition),
                ..
            } => self.failure(&format!("{label}: {condition}")),
            RunOutcome::Failed { message, .. } | RunOutcome::Errored { message } => {
                self.failure(&format!("{label}: {message}"));
            }
        }
    }

    /// Print suite summary
    pub fn summary(&self, suite: &SuiteReport) {
        let failed = suite.failed() + suite.errored();
        if self.quiet && failed == 0 {
            return;
        }

        self.line("");
        let passed = suite.passed();
        let skipped = suite.skipped();
        let total = suite.total();
        let secs = Duration::from_millis(suite.duration_ms).as_secs_f64();

        if self.use_color {
            let passed_style = Style::new().green().bold();
            let failed_style = Style::new().red().bold();
            let skipped_style = Style::new().yellow();

            let status = if failed > 0 {
                failed_style.apply_to("FAILED")
            } else {
                passed_style.apply_to("PASSED")
            };

            self.line(&format!(
                "{} {} scenarios in {:.2}s ({} passed, {} failed, {} skipped)",
                status,
                total,
                secs,
                passed_style.apply_to(passed),
                if failed > 0 {
                    failed_style.apply_to(failed).to_string()
                } else {
                    failed.to_string()
                },
                skipped_style.apply_to(skipped)
            ));
        } else {
            let status = if failed > 0 { "FAILED" } else { "PASSED" };
            self.line(&format!(
                "{status} {total} scenarios in {secs:.2}s ({passed} passed, {failed} failed, {skipped} skipped)"
            ));
        }
    }
}

/// One listing line: id, content type, lead type, name
#[must_use]
pub fn scenario_line(scenario: &Scenario) -> String {
    let draws = scenario
        .draw_count
        .map(|n| format!(" x{n}"))
        .unwrap_or_default();
    format!(
        "{:<12} {:<9} {:<10} {}{draws}",
        scenario.id,
        scenario.content_type.to_string(),
        scenario.lead_type.to_string(),
        scenario.name
    )
}
