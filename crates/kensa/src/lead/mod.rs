//! Lead-capture gates
//!
//! A gate runs after the user starts the content and before the draw or
//! result is shown. It either hands back the page the content continues on,
//! or reports a skip when an external condition (a CAPTCHA) makes the run
//! impossible to finish. Skips are neither pass nor fail.

mod embed_form;
mod form;
mod line;
mod sns;

pub use embed_form::EmbedFormGate;
pub use form::FormGate;
pub use line::LineGate;
pub use sns::SnsGate;

use crate::context::RunContext;
use crate::driver::PageId;
use crate::result::KensaResult;
use crate::scenario::{LeadTiming, LeadType, Scenario};
use async_trait::async_trait;

/// Point in a flow where a gate may appear
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadPhase {
    /// After pressing start on Top
    BeforeStart,
    /// After pressing the result button (diagnose)
    BeforeResult,
}

impl From<LeadTiming> for LeadPhase {
    fn from(timing: LeadTiming) -> Self {
        match timing {
            LeadTiming::BeforeStart => Self::BeforeStart,
            LeadTiming::BeforeResult => Self::BeforeResult,
        }
    }
}

/// How a gate ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadOutcome {
    /// Continue the flow on this page
    Continue(PageId),
    /// Stop the run without failing it
    Skip {
        /// Named condition that caused the skip
        reason: String,
    },
}

/// One lead-capture strategy
#[async_trait]
pub trait LeadGate: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Pass the gate starting from `ctx.page`
    async fn apply(&self, ctx: &mut RunContext<'_>, scenario: &Scenario) -> KensaResult<LeadOutcome>;
}

/// Gate for a lead type; `None` when the content has no gate
#[must_use]
pub fn gate_for(lead_type: LeadType) -> Option<Box<dyn LeadGate>> {
    match lead_type {
        LeadType::None => None,
        LeadType::Line => Some(Box::new(LineGate)),
        LeadType::Sns => Some(Box::new(SnsGate)),
        LeadType::Form => Some(Box::new(FormGate)),
        LeadType::EmbedForm => Some(Box::new(EmbedFormGate)),
    }
}

/// Run the scenario's gate if it belongs to `phase`
///
/// On `Continue` the context is moved to the returned page.
pub async fn run_lead(
    ctx: &mut RunContext<'_>,
    scenario: &Scenario,
    phase: LeadPhase,
) -> KensaResult<LeadOutcome> {
    let expected = LeadPhase::from(scenario.lead_params.lead_timing);
    let gate = match gate_for(scenario.lead_type) {
        Some(gate) if expected == phase => gate,
        _ => return Ok(LeadOutcome::Continue(ctx.page.clone())),
    };

    tracing::info!(scenario = %scenario.id, gate = gate.name(), ?phase, "applying lead gate");
    let outcome = gate.apply(ctx, scenario).await?;
    match &outcome {
        LeadOutcome::Continue(page) => {
            ctx.page = page.clone();
            tracing::info!(gate = gate.name(), page = %page, "lead gate passed");
        }
        LeadOutcome::Skip { reason } => {
            tracing::warn!(gate = gate.name(), reason = %reason, "lead gate skipped the run");
        }
    }
    Ok(outcome)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::artifacts::Artifacts;
    use crate::config::HarnessConfig;
    use crate::mock::{MockApp, MockNode, MockPage, MockSession};
    use crate::scenario::parse_scenarios;
    use tempfile::TempDir;

    struct Empty;

    impl MockApp for Empty {
        fn render(&mut self, _page: &MockPage) -> MockNode {
            MockNode::new("body")
        }
    }

    fn scenario(lead: &str, timing: &str) -> Scenario {
        let yaml = format!(
            "- {{id: d1, content_type: diagnose, name: n, url: 'https://example.com/d', \
             lead_type: {lead}, lead_params: {{lead_timing: {timing}, answers: {{q1: a, q2: b, q3: c}}}}}}"
        );
        parse_scenarios(&yaml).unwrap().remove(0)
    }

    #[test]
    fn test_gate_selection() {
        assert!(gate_for(LeadType::None).is_none());
        assert_eq!(gate_for(LeadType::Line).unwrap().name(), "line");
        assert_eq!(gate_for(LeadType::Sns).unwrap().name(), "sns");
        assert_eq!(gate_for(LeadType::Form).unwrap().name(), "form");
        assert_eq!(gate_for(LeadType::EmbedForm).unwrap().name(), "embed_form");
    }

    #[test]
    fn test_gate_futures_are_send() {
        fn assert_send<T: Send>(_: &T) {}

        let tmp = TempDir::new().unwrap();
        let mut session = MockSession::new(Empty);
        let config = HarnessConfig::new();
        let mut artifacts = Artifacts::new(tmp.path(), "d1");
        let mut ctx = RunContext::new(&mut session, &config, &mut artifacts);
        let sc = scenario("form", "before_start");

        for lead in [LeadType::Line, LeadType::Sns, LeadType::Form, LeadType::EmbedForm] {
            let gate: Box<dyn LeadGate> = gate_for(lead).unwrap();
            let fut = gate.apply(&mut ctx, &sc);
            assert_send(&fut);
            drop(fut);
        }
        let fut = run_lead(&mut ctx, &sc, LeadPhase::BeforeStart);
        assert_send(&fut);
    }

    #[tokio::test]
    async fn test_gate_skipped_in_other_phase() {
        let tmp = TempDir::new().unwrap();
        let mut session = MockSession::new(Empty);
        let config = HarnessConfig::new();
        let mut artifacts = Artifacts::new(tmp.path(), "d1");
        let mut ctx = RunContext::new(&mut session, &config, &mut artifacts);

        // A form gate due before the result is not run at the start phase;
        // running it on an empty page would fail.
        let sc = scenario("form", "before_result");
        let outcome = run_lead(&mut ctx, &sc, LeadPhase::BeforeStart).await.unwrap();
        assert_eq!(outcome, LeadOutcome::Continue(PageId::new("page-1")));
        assert!(ctx.artifacts.captured().is_empty());
    }

    #[tokio::test]
    async fn test_no_gate_continues() {
        let tmp = TempDir::new().unwrap();
        let mut session = MockSession::new(Empty);
        let config = HarnessConfig::new();
        let mut artifacts = Artifacts::new(tmp.path(), "d1");
        let mut ctx = RunContext::new(&mut session, &config, &mut artifacts);

        let sc = scenario("none", "before_start");
        let outcome = run_lead(&mut ctx, &sc, LeadPhase::BeforeStart).await.unwrap();
        assert!(matches!(outcome, LeadOutcome::Continue(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_runs_in_its_phase() {
        let tmp = TempDir::new().unwrap();
        let mut session = MockSession::new(Empty);
        let config = HarnessConfig::new();
        let mut artifacts = Artifacts::new(tmp.path(), "d1");
        let mut ctx = RunContext::new(&mut session, &config, &mut artifacts);

        let sc = scenario("form", "before_result");
        let err = run_lead(&mut ctx, &sc, LeadPhase::BeforeResult).await.unwrap_err();
        assert_eq!(err.condition(), Some("form_screen_not_visible"));
    }
}
