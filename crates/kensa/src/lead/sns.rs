//! SNS follow gate.

use super::{LeadGate, LeadOutcome};
use crate::context::RunContext;
use crate::driver::{ElementInfo, Selector};
use crate::result::KensaResult;
use crate::scenario::Scenario;
use crate::selectors::{sns, DIALOG};
use async_trait::async_trait;
use tokio::time::{sleep, Instant};

/// Account links, check marks and the CTA inside the gate modal
#[derive(Debug, Clone, Copy, Default)]
pub struct SnsGate;

/// Snapshot of the check marks and the CTA
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckState {
    /// Unconfirmed accounts
    pub gray: usize,
    /// Confirmed accounts
    pub green: usize,
    /// CTA can be pressed
    pub cta_enabled: bool,
}

impl CheckState {
    /// Every account confirmed and the CTA usable
    #[must_use]
    pub const fn is_ready(&self, accounts: usize) -> bool {
        self.gray == 0 && self.green == accounts && self.cta_enabled
    }

    /// Failure name when the initial state breaks the gate rules
    #[must_use]
    pub const fn initial_violation(&self) -> Option<&'static str> {
        if self.gray > 0 && self.cta_enabled {
            Some("sns_gray_exists_but_cta_enabled")
        } else if self.gray == 0 && !self.cta_enabled {
            Some("sns_all_green_but_cta_disabled")
        } else {
            None
        }
    }
}

/// Whether the CTA accepts clicks: no `aria-disabled`, no disabled class
/// and pointer events enabled
#[must_use]
pub fn cta_enabled(cta: &ElementInfo) -> bool {
    let aria_disabled = cta.attr_or_empty("aria-disabled").eq_ignore_ascii_case("true");
    let class_disabled = cta
        .attr_or_empty("class")
        .split_whitespace()
        .any(|c| c == sns::CTA_DISABLED_CLASS);
    !aria_disabled && !class_disabled && !cta.pointer_events_none
}

fn modal() -> Selector {
    Selector::css(DIALOG).has_text(sns::MODAL_TEXT)
}

fn in_modal(css: &str) -> Selector {
    modal().find(Selector::css(css))
}

async fn check_state(ctx: &mut RunContext<'_>) -> KensaResult<CheckState> {
    let gray = ctx.count(&in_modal(sns::CHECK_GRAY)).await?;
    let green = ctx.count(&in_modal(sns::CHECK_GREEN)).await?;
    let cta_enabled = ctx
        .first(&in_modal(sns::CTA))
        .await?
        .is_some_and(|cta| cta_enabled(&cta));
    Ok(CheckState {
        gray,
        green,
        cta_enabled,
    })
}

#[async_trait]
impl LeadGate for SnsGate {
    fn name(&self) -> &'static str {
        "sns"
    }

    async fn apply(&self, ctx: &mut RunContext<'_>, _scenario: &Scenario) -> KensaResult<LeadOutcome> {
        let t = ctx.config.timeouts;
        ctx.expect_visible(&modal(), t.slow_screen, "sns_modal_missing")
            .await?;

        let links = ctx.query(&in_modal(sns::ACCOUNT_LINKS)).await?;
        let accounts = links.len();
        if accounts < sns::MIN_ACCOUNTS {
            tracing::error!(accounts, "too few SNS accounts");
            return Err(ctx.fail("sns_links_less_than_3").await);
        }
        let cta_count = ctx.count(&in_modal(sns::CTA)).await?;
        ctx.ensure(cta_count > 0, "sns_cta_missing").await?;

        let initial = check_state(ctx).await?;
        tracing::debug!(?initial, accounts, "SNS initial state");
        if let Some(violation) = initial.initial_violation() {
            return Err(ctx.fail(violation).await);
        }

        // Every account is visited, confirmed or not.
        for (i, link) in links.iter().enumerate() {
            let n = i + 1;
            if link.attr_or_empty("href").is_empty() {
                return Err(ctx.fail(&format!("sns_link_{n}_href_empty")).await);
            }
            let selector = in_modal(sns::ACCOUNT_LINKS).nth(i);
            match ctx.click_for_new_page(&selector, t.popup).await {
                Ok(Some(opened)) => ctx.close_quietly(&opened).await,
                Ok(None) | Err(_) => {
                    return Err(ctx.fail(&format!("sns_link_{n}_not_opened")).await);
                }
            }
            ctx.pause().await;
        }

        if initial.gray > 0 {
            let start = Instant::now();
            loop {
                let state = check_state(ctx).await?;
                if state.is_ready(accounts) {
                    break;
                }
                if start.elapsed() >= t.sns_converge {
                    tracing::error!(?state, accounts, "SNS checks did not converge");
                    return Err(ctx.fail("sns_after_visits_not_ready").await);
                }
                sleep(ctx.config.poll_interval).await;
            }
        } else {
            let state = check_state(ctx).await?;
            if !state.is_ready(accounts) {
                tracing::error!(?state, accounts, "SNS state changed after visits");
                return Err(ctx.fail("sns_all_green_but_changed_after_visits").await);
            }
        }

        let cta = in_modal(sns::CTA).first();
        if ctx.safe_click(&cta).await.is_err() {
            return Err(ctx.fail("sns_cta_click_failed").await);
        }
        Ok(LeadOutcome::Continue(ctx.page.clone()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::artifacts::Artifacts;
    use crate::config::HarnessConfig;
    use crate::mock::{MockApp, MockEvent, MockNode, MockPage, MockSession, MockWorld};
    use crate::scenario::parse_scenarios;
    use tempfile::TempDir;

    /// Gate with `accounts` links; visiting marks an account green
    struct SnsApp {
        visited: Vec<bool>,
        /// CTA state is broken on purpose
        cta_always_enabled: bool,
        passed: bool,
    }

    impl SnsApp {
        fn new(visited: Vec<bool>) -> Self {
            Self {
                visited,
                cta_always_enabled: false,
                passed: false,
            }
        }
    }

    impl MockApp for SnsApp {
        fn render(&mut self, page: &MockPage) -> MockNode {
            if !page.url.starts_with("https://example.com/g") {
                return MockNode::new("body").text("sns profile");
            }
            if self.passed {
                return MockNode::new("body").child(MockNode::button("スタート"));
            }
            let all = self.visited.iter().all(|v| *v);
            let mut cta = MockNode::link("#")
                .attr("role", "button")
                .text(sns::CTA_TEXT)
                .on_click("cta");
            if !all && !self.cta_always_enabled {
                cta = cta.class("MuiButton-root Mui-disabled");
            }
            let rows = self.visited.iter().enumerate().map(|(i, v)| {
                let check = if *v { "css-qy6vmb" } else { "css-l0elaw" };
                MockNode::div().children([
                    MockNode::link(format!("https://sns.example/{i}"))
                        .attr("target", "_blank")
                        .text(format!("account {i}"))
                        .on_click(format!("visit:{i}")),
                    MockNode::new("svg")
                        .attr("data-testid", "CheckCircleIcon")
                        .class(&format!("MuiSvgIcon-root {check}")),
                ])
            });
            MockNode::new("body").child(
                MockNode::div()
                    .attr("data-scope", "dialog")
                    .attr("data-part", "content")
                    .attr("role", "dialog")
                    .child(MockNode::new("p").text(sns::MODAL_TEXT))
                    .children(rows)
                    .child(cta),
            )
        }

        fn handle(&mut self, event: &MockEvent, _world: &mut MockWorld<'_>) {
            if let MockEvent::Click { action } = event {
                if let Some(i) = action.strip_prefix("visit:") {
                    let i: usize = i.parse().unwrap();
                    self.visited[i] = true;
                } else if action == "cta" {
                    self.passed = true;
                }
            }
        }
    }

    fn scenario() -> Scenario {
        parse_scenarios(
            "- {id: s1, content_type: gacha, name: n, url: 'https://example.com/g', lead_type: sns, draw_count: 1}",
        )
        .unwrap()
        .remove(0)
    }

    async fn run(app: SnsApp) -> (KensaResult<LeadOutcome>, Vec<String>, usize) {
        let tmp = TempDir::new().unwrap();
        let mut session = MockSession::new(app);
        let config = HarnessConfig::new();
        let mut artifacts = Artifacts::new(tmp.path(), "s1");
        let result = {
            let mut ctx = RunContext::new(&mut session, &config, &mut artifacts);
            let main = ctx.page.clone();
            ctx.session.goto(&main, "https://example.com/g").await.unwrap();
            SnsGate.apply(&mut ctx, &scenario()).await
        };
        let pages = session.open_pages().len();
        (result, artifacts.captured().to_vec(), pages)
    }

    #[test]
    fn test_cta_enabled_rules() {
        let mut cta = ElementInfo::default();
        assert!(cta_enabled(&cta));
        cta.attrs.insert("aria-disabled".into(), "true".into());
        assert!(!cta_enabled(&cta));
        cta.attrs.clear();
        cta.attrs.insert("class".into(), "MuiButton-root Mui-disabled".into());
        assert!(!cta_enabled(&cta));
        cta.attrs.clear();
        cta.pointer_events_none = true;
        assert!(!cta_enabled(&cta));
    }

    #[test]
    fn test_initial_violations() {
        let state = |gray, green, cta_enabled| CheckState {
            gray,
            green,
            cta_enabled,
        };
        assert_eq!(
            state(1, 2, true).initial_violation(),
            Some("sns_gray_exists_but_cta_enabled")
        );
        assert_eq!(
            state(0, 3, false).initial_violation(),
            Some("sns_all_green_but_cta_disabled")
        );
        assert_eq!(state(2, 1, false).initial_violation(), None);
        assert_eq!(state(0, 3, true).initial_violation(), None);
        assert!(state(0, 3, true).is_ready(3));
        assert!(!state(0, 2, true).is_ready(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gray_accounts_converge_after_visits() {
        let (result, captured, pages) = run(SnsApp::new(vec![true, false, false])).await;
        assert!(matches!(result.unwrap(), LeadOutcome::Continue(_)));
        assert!(captured.is_empty());
        // every opened profile page was closed again
        assert_eq!(pages, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_green_stays_ready() {
        let (result, _, _) = run(SnsApp::new(vec![true; 4])).await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_too_few_accounts() {
        let (result, captured, _) = run(SnsApp::new(vec![true, true])).await;
        assert_eq!(result.unwrap_err().condition(), Some("sns_links_less_than_3"));
        assert_eq!(captured, ["sns_links_less_than_3".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gray_with_enabled_cta_fails() {
        let mut app = SnsApp::new(vec![false, false, true]);
        app.cta_always_enabled = true;
        let (result, _, _) = run(app).await;
        assert_eq!(
            result.unwrap_err().condition(),
            Some("sns_gray_exists_but_cta_enabled")
        );
    }
}
