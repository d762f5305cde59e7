//! Run orchestration: one exclusively owned session per scenario, dispatch by
//! content type, last-state capture and exactly-once trace finalization.

use crate::artifacts::Artifacts;
use crate::config::HarnessConfig;
use crate::context::RunContext;
use crate::driver::BrowserSession;
use crate::flow;
use crate::result::{KensaError, KensaResult};
use crate::scenario::{ContentType, Scenario};
use crate::trace::RecordingSession;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Supplies a fresh browser session for each scenario
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Launch or build the session for `scenario`
    async fn create(&self, scenario: &Scenario) -> KensaResult<Box<dyn BrowserSession>>;
}

// =============================================================================
// OUTCOMES
// =============================================================================

/// Terminal state of one scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every check held
    Passed,
    /// A check, wait or page action failed
    Failed {
        /// Named condition, when the failure carried one
        condition: Option<String>,
        /// Error message
        message: String,
    },
    /// An external gate stopped the run
    Skipped {
        /// Why
        reason: String,
    },
    /// The scenario or harness is misconfigured
    Errored {
        /// Error message
        message: String,
    },
}

impl RunOutcome {
    /// Classify a flow result
    #[must_use]
    pub fn from_result(result: &KensaResult<()>) -> Self {
        match result {
            Ok(()) => Self::Passed,
            Err(KensaError::Skipped { reason }) => Self::Skipped {
                reason: reason.clone(),
            },
            Err(e) if e.is_configuration() => Self::Errored {
                message: e.to_string(),
            },
            Err(e) => Self::Failed {
                condition: e.condition().map(str::to_string),
                message: e.to_string(),
            },
        }
    }

    /// Short label for logs and trace metadata
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } => "skipped",
            Self::Errored { .. } => "errored",
        }
    }

    /// Whether this outcome fails the suite
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Errored { .. })
    }
}

/// Report for one scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Scenario id
    pub id: String,
    /// Scenario name
    pub name: String,
    /// Content kind
    pub content_type: ContentType,
    /// Terminal state
    pub outcome: RunOutcome,
    /// Wall time
    pub duration_ms: u64,
    /// Artifact conditions captured, in order
    pub artifacts: Vec<String>,
    /// Trace archive, when one was written
    pub trace: Option<PathBuf>,
}

impl ScenarioReport {
    fn new(scenario: &Scenario, outcome: RunOutcome, duration: Duration) -> Self {
        Self {
            id: scenario.id.clone(),
            name: scenario.name.clone(),
            content_type: scenario.content_type,
            outcome,
            duration_ms: duration.as_millis() as u64,
            artifacts: Vec::new(),
            trace: None,
        }
    }
}

/// Reports of a whole run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuiteReport {
    /// Run start (RFC 3339)
    pub started_at: String,
    /// Per-scenario reports in run order
    pub scenarios: Vec<ScenarioReport>,
    /// Total wall time
    pub duration_ms: u64,
}

impl SuiteReport {
    /// Empty report stamped now
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: chrono::Utc::now().to_rfc3339(),
            ..Self::default()
        }
    }

    /// Add one scenario report
    pub fn push(&mut self, report: ScenarioReport) {
        self.duration_ms += report.duration_ms;
        self.scenarios.push(report);
    }

    fn count(&self, pred: impl Fn(&RunOutcome) -> bool) -> usize {
        self.scenarios.iter().filter(|r| pred(&r.outcome)).count()
    }

    /// Scenarios that passed
    #[must_use]
    pub fn passed(&self) -> usize {
        self.count(|o| matches!(o, RunOutcome::Passed))
    }

    /// Scenarios that failed
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, RunOutcome::Failed { .. }))
    }

    /// Scenarios that were skipped
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, RunOutcome::Skipped { .. }))
    }

    /// Scenarios that were misconfigured
    #[must_use]
    pub fn errored(&self) -> usize {
        self.count(|o| matches!(o, RunOutcome::Errored { .. }))
    }

    /// Total scenario count
    #[must_use]
    pub fn total(&self) -> usize {
        self.scenarios.len()
    }

    /// No failures and no configuration errors; skips are tolerated
    #[must_use]
    pub fn all_passed(&self) -> bool {
        !self.scenarios.iter().any(|r| r.outcome.is_failure())
    }

    /// Save the report as pretty JSON
    pub fn save_json(&self, path: &Path) -> KensaResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a saved report
    pub fn load_json(path: &Path) -> KensaResult<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

// =============================================================================
// ORCHESTRATION
// =============================================================================

/// Run the content flow matching the scenario's content type
pub async fn dispatch(ctx: &mut RunContext<'_>, scenario: &Scenario) -> KensaResult<()> {
    match scenario.content_type {
        ContentType::Gacha => flow::run_gacha(ctx, scenario).await,
        ContentType::Diagnose => flow::run_diagnose(ctx, scenario).await,
        ContentType::Survey => {
            ctx.capture("unsupported_content_type").await;
            Err(KensaError::config(format!(
                "{}: no verification flow for content type {}",
                scenario.id, scenario.content_type
            )))
        }
    }
}

/// Run one scenario end to end
///
/// The session is wrapped in a recorder; whatever the outcome, the final
/// page state is captured on failure, the trace is written once and the
/// session is closed.
pub async fn run_scenario(
    factory: &dyn SessionFactory,
    scenario: &Scenario,
    config: &HarnessConfig,
) -> ScenarioReport {
    let started = Instant::now();
    tracing::info!(scenario = %scenario.id, name = %scenario.name, content = %scenario.content_type, "scenario start");

    let inner = match factory.create(scenario).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(scenario = %scenario.id, error = %e, "session launch failed");
            let outcome = RunOutcome::from_result(&Err(e));
            return ScenarioReport::new(scenario, outcome, started.elapsed());
        }
    };
    let mut session = RecordingSession::new(inner, &scenario.id);
    let mut artifacts = Artifacts::new(&config.artifact_dir, &scenario.id);

    let (result, page) = {
        let mut ctx = RunContext::new(&mut session, config, &mut artifacts);
        let result = dispatch(&mut ctx, scenario).await;
        (result, ctx.page)
    };
    if matches!(&result, Err(e) if !e.is_skip()) {
        artifacts.capture_last(&mut session, &page).await;
    }

    let outcome = RunOutcome::from_result(&result);
    let trace = match session
        .recorder_mut()
        .finalize(&config.artifact_dir, outcome.label())
    {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!(scenario = %scenario.id, error = %e, "trace not saved");
            None
        }
    };
    if let Err(e) = session.close().await {
        tracing::warn!(scenario = %scenario.id, error = %e, "session close failed");
    }

    match &outcome {
        RunOutcome::Passed => tracing::info!(scenario = %scenario.id, "scenario passed"),
        RunOutcome::Skipped { reason } => tracing::info!(scenario = %scenario.id, reason = %reason, "scenario skipped"),
        RunOutcome::Failed { message, .. } | RunOutcome::Errored { message } => {
            tracing::error!(scenario = %scenario.id, error = %message, "scenario did not pass");
        }
    }

    let mut report = ScenarioReport::new(scenario, outcome, started.elapsed());
    report.artifacts = artifacts.captured().to_vec();
    report.trace = trace;
    report
}

/// Run scenarios one after another, each in its own session
pub async fn run_suite(factory: &dyn SessionFactory, scenarios: &[Scenario], config: &HarnessConfig) -> SuiteReport {
    let mut suite = SuiteReport::new();
    for scenario in scenarios {
        suite.push(run_scenario(factory, scenario, config).await);
    }
    suite
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mock::{MockApp, MockNode, MockPage, MockSession};
    use crate::scenario::parse_scenarios;
    use tempfile::TempDir;

    struct Blank;

    impl MockApp for Blank {
        fn render(&mut self, _page: &MockPage) -> MockNode {
            MockNode::new("body").text("nothing here")
        }
    }

    struct BlankFactory;

    #[async_trait]
    impl SessionFactory for BlankFactory {
        async fn create(&self, _scenario: &Scenario) -> KensaResult<Box<dyn BrowserSession>> {
            Ok(Box::new(MockSession::new(Blank)))
        }
    }

    struct BrokenFactory;

    #[async_trait]
    impl SessionFactory for BrokenFactory {
        async fn create(&self, _scenario: &Scenario) -> KensaResult<Box<dyn BrowserSession>> {
            Err(KensaError::session("chromium not found"))
        }
    }

    fn scenarios() -> Vec<Scenario> {
        parse_scenarios(
            r"
- id: g1
  content_type: gacha
  name: gacha one
  url: https://example.com/g/1
  lead_type: none
  draw_count: 3
- id: s1
  content_type: survey
  name: survey one
  url: https://example.com/s/1
  lead_type: none
",
        )
        .unwrap()
    }

    fn config(dir: &TempDir) -> HarnessConfig {
        HarnessConfig::new().with_artifact_dir(dir.path())
    }

    mod outcome_tests {
        use super::*;

        #[test]
        fn test_classification() {
            assert_eq!(RunOutcome::from_result(&Ok(())), RunOutcome::Passed);
            assert_eq!(
                RunOutcome::from_result(&Err(KensaError::skipped("captcha"))),
                RunOutcome::Skipped {
                    reason: "captcha".into()
                }
            );
            assert!(matches!(
                RunOutcome::from_result(&Err(KensaError::config("no creds"))),
                RunOutcome::Errored { .. }
            ));
            let failed = RunOutcome::from_result(&Err(KensaError::mismatch("no_card")));
            assert!(matches!(failed, RunOutcome::Failed { condition: Some(ref c), .. } if c == "no_card"));
        }

        #[test]
        fn test_skips_do_not_fail_the_suite() {
            let s = &scenarios()[0];
            let mut suite = SuiteReport::new();
            suite.push(ScenarioReport::new(s, RunOutcome::Passed, Duration::ZERO));
            suite.push(ScenarioReport::new(
                s,
                RunOutcome::Skipped { reason: "x".into() },
                Duration::ZERO,
            ));
            assert!(suite.all_passed());
            suite.push(ScenarioReport::new(
                s,
                RunOutcome::Errored { message: "x".into() },
                Duration::ZERO,
            ));
            assert!(!suite.all_passed());
            assert_eq!((suite.passed(), suite.skipped(), suite.errored()), (1, 1, 1));
        }

        #[test]
        fn test_report_json_roundtrip() {
            let dir = TempDir::new().unwrap();
            let mut suite = SuiteReport::new();
            suite.push(ScenarioReport::new(
                &scenarios()[0],
                RunOutcome::Failed {
                    condition: Some("no_card".into()),
                    message: "Verification failed: no_card".into(),
                },
                Duration::from_millis(12),
            ));
            let path = dir.path().join("report.json");
            suite.save_json(&path).unwrap();
            let loaded = SuiteReport::load_json(&path).unwrap();
            assert_eq!(loaded.scenarios[0].outcome, suite.scenarios[0].outcome);
            assert_eq!(loaded.failed(), 1);
        }
    }

    mod orchestration_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_failure_captures_last_and_writes_trace() {
            let dir = TempDir::new().unwrap();
            let report = run_scenario(&BlankFactory, &scenarios()[0], &config(&dir)).await;

            assert!(matches!(
                report.outcome,
                RunOutcome::Failed { condition: Some(ref c), .. } if c == "top_start_not_visible"
            ));
            assert_eq!(report.artifacts.last().map(String::as_str), Some("last"));
            let trace = report.trace.expect("trace written");
            assert!(trace.starts_with(dir.path().join("g1")));
            assert!(trace.exists());
        }

        #[tokio::test(start_paused = true)]
        async fn test_survey_is_configuration_error() {
            let dir = TempDir::new().unwrap();
            let report = run_scenario(&BlankFactory, &scenarios()[1], &config(&dir)).await;
            assert!(matches!(report.outcome, RunOutcome::Errored { .. }));
            assert_eq!(report.artifacts[0], "unsupported_content_type");
            assert!(report.trace.is_some());
        }

        #[tokio::test(start_paused = true)]
        async fn test_launch_failure_has_no_trace() {
            let dir = TempDir::new().unwrap();
            let report = run_scenario(&BrokenFactory, &scenarios()[0], &config(&dir)).await;
            assert!(matches!(report.outcome, RunOutcome::Failed { condition: None, .. }));
            assert!(report.trace.is_none());
        }

        #[tokio::test(start_paused = true)]
        async fn test_suite_runs_in_order() {
            let dir = TempDir::new().unwrap();
            let suite = run_suite(&BlankFactory, &scenarios(), &config(&dir)).await;
            let ids: Vec<&str> = suite.scenarios.iter().map(|r| r.id.as_str()).collect();
            assert_eq!(ids, vec!["g1", "s1"]);
            assert!(!suite.all_passed());
        }
    }
}
