//! LINE login gate
//!
//! The consent modal links to the LINE OAuth page, which may open as a
//! popup, a new tab or a same-tab navigation. After login the content comes
//! back on some page that is not on a LINE host; every open page is scanned
//! for the screen the gate is expected to lead to.

use super::{LeadGate, LeadOutcome};
use crate::context::{safe_click_on, RunContext};
use crate::driver::{is_visible, PageId, Selector};
use crate::result::{KensaError, KensaResult};
use crate::scenario::Scenario;
use crate::screen::{wait_across_pages, wait_visible, Probe, Screen};
use crate::selectors::{gacha, line, paid, DIALOG};
use async_trait::async_trait;
use std::collections::HashSet;
use tokio::time::{sleep, Instant};

/// LINE consent and OAuth login
#[derive(Debug, Clone, Copy, Default)]
pub struct LineGate;

/// Screens the content can return to after login, highest priority first
#[must_use]
pub fn return_screens() -> Vec<Screen> {
    vec![
        Screen::new("draw_count", Probe::Visible(Selector::exact_text("1"))),
        Screen::all(
            "single_start",
            [
                Probe::Visible(Selector::exact_text(gacha::SINGLE_START_TEXT)),
                Probe::Absent(Selector::exact_text("1")),
            ],
        ),
        Screen::all(
            "purchase_confirm",
            [
                Probe::Visible(Selector::exact_text(paid::CONFIRM_TITLE_TEXT)),
                Probe::Attached(Selector::css(paid::QUANTITY_SELECT)),
                Probe::Visible(Selector::css("button").has_text(paid::BUY_TEXT)),
            ],
        ),
        Screen::all(
            "member_login",
            [
                Probe::Visible(Selector::exact_text(paid::MEMBER_LOGIN_TITLE_TEXT)),
                Probe::Attached(Selector::css(paid::MEMBER_EMAIL)),
                Probe::Attached(Selector::css(paid::MEMBER_PASSWORD)),
                Probe::Visible(Selector::css("button").has_text(paid::LOGIN_TEXT)),
            ],
        ),
    ]
}

fn trigger_candidates(image_found: bool, text_found: bool) -> Vec<Selector> {
    let modal = Selector::css(DIALOG);
    let mut out = Vec::new();
    if image_found {
        let img = modal
            .clone()
            .find(Selector::css(line::LOGIN_TRIGGER_IMAGE))
            .first();
        out.extend([img.clone(), img.clone().parent(1), img.parent(2)]);
    }
    if text_found {
        let text = modal.find(Selector::text(line::LOGIN_TRIGGER_TEXT)).first();
        out.extend([text.clone(), text.clone().parent(1), text.parent(2)]);
    }
    out
}

impl LineGate {
    async fn click_trigger(&self, ctx: &mut RunContext<'_>) -> KensaResult<()> {
        let modal = Selector::css(DIALOG);
        let image_found = ctx
            .count(&modal.clone().find(Selector::css(line::LOGIN_TRIGGER_IMAGE)))
            .await?
            > 0;
        let text_found = ctx
            .count(&modal.find(Selector::text(line::LOGIN_TRIGGER_TEXT)))
            .await?
            > 0;

        let candidates = trigger_candidates(image_found, text_found);
        if candidates.is_empty() {
            return Err(ctx.fail("line_trigger_not_found").await);
        }
        for candidate in &candidates {
            match ctx.safe_click(candidate).await {
                Ok(()) => {
                    tracing::debug!(trigger = %candidate, "LINE trigger clicked");
                    ctx.pause().await;
                    return Ok(());
                }
                Err(e) => tracing::debug!(trigger = %candidate, error = %e, "trigger candidate failed"),
            }
        }
        Err(ctx.fail("line_trigger_click_failed").await)
    }

    /// Page showing the LINE login, or the current page when none appears
    async fn find_login_page(
        &self,
        ctx: &mut RunContext<'_>,
        before: &HashSet<PageId>,
    ) -> KensaResult<PageId> {
        let current = ctx.page.clone();
        let start = Instant::now();
        loop {
            if line::is_line_domain(&ctx.session.url(&current).await?) {
                return Ok(current);
            }

            let mut fresh = None;
            let mut existing = None;
            for page in ctx.session.pages().await? {
                let Ok(url) = ctx.session.url(&page).await else {
                    continue;
                };
                if !line::is_line_domain(&url) {
                    continue;
                }
                if before.contains(&page) {
                    existing.get_or_insert(page);
                } else {
                    fresh.get_or_insert(page);
                }
            }
            if let Some(page) = fresh.or(existing) {
                if let Err(e) = ctx.session.bring_to_front(&page).await {
                    tracing::debug!(page = %page, error = %e, "bring_to_front failed");
                }
                return Ok(page);
            }

            if start.elapsed() >= ctx.config.timeouts.screen {
                tracing::warn!("no LINE page appeared, continuing on the current page");
                return Ok(current);
            }
            sleep(ctx.config.poll_interval).await;
        }
    }

    async fn form_login(&self, ctx: &mut RunContext<'_>, login_page: &PageId) -> KensaResult<()> {
        let creds = match ctx.config.credentials.require_line() {
            Ok(creds) => creds.clone(),
            Err(e) => {
                ctx.artifacts
                    .capture(ctx.session, login_page, "line_env_missing")
                    .await;
                return Err(e);
            }
        };

        let submit = Selector::any([
            Selector::css("button[type='submit']").has_text(line::LOGIN_TEXT),
            Selector::css("button").has_text(line::LOGIN_TEXT),
        ]);
        let opts = ctx.wait(ctx.config.timeouts.action);
        let result: KensaResult<()> = async {
            let id_input = Selector::css(line::FORM_ID_INPUT);
            let password_input = Selector::css(line::FORM_PASSWORD_INPUT);
            if !wait_visible(ctx.session, login_page, &id_input, opts).await?
                || !wait_visible(ctx.session, login_page, &password_input, opts).await?
            {
                return Err(KensaError::session("LINE login inputs not visible"));
            }
            ctx.session.fill(login_page, &id_input, &creds.email).await?;
            ctx.session
                .fill(login_page, &password_input, &creds.password)
                .await?;
            if !wait_visible(ctx.session, login_page, &submit, opts).await? {
                return Err(KensaError::session("LINE login submit not visible"));
            }
            safe_click_on(ctx.session, login_page, &submit.clone().first()).await
        }
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "LINE form login failed");
                Err(ctx.fail_on(login_page, "line_form_login_failed").await)
            }
        }
    }

    async fn button_login(&self, ctx: &mut RunContext<'_>, login_page: &PageId) -> KensaResult<()> {
        let button = Selector::any([
            Selector::css("button").has_text(line::LOGIN_TEXT),
            Selector::css(format!("input[type='submit'][value='{}']", line::LOGIN_TEXT)),
        ]);
        if ctx.session.count(login_page, &button).await? == 0 {
            return Err(ctx.fail_on(login_page, "line_login_button_not_found").await);
        }
        let opts = ctx.wait(ctx.config.timeouts.action);
        let clicked = wait_visible(ctx.session, login_page, &button, opts).await?
            && safe_click_on(ctx.session, login_page, &button.clone().first())
                .await
                .is_ok();
        if clicked {
            Ok(())
        } else {
            Err(ctx.fail_on(login_page, "line_login_click_failed").await)
        }
    }

    async fn login(&self, ctx: &mut RunContext<'_>, login_page: &PageId) -> KensaResult<()> {
        let id_visible =
            is_visible(ctx.session, login_page, &Selector::css(line::FORM_ID_INPUT)).await?;
        let password_visible =
            is_visible(ctx.session, login_page, &Selector::css(line::FORM_PASSWORD_INPUT)).await?;

        let result = if id_visible || password_visible {
            tracing::info!("LINE login form shown, using configured account");
            self.form_login(ctx, login_page).await
        } else {
            self.button_login(ctx, login_page).await
        };
        if let Err(e) = &result {
            if !e.is_configuration() {
                ctx.artifacts
                    .capture(ctx.session, login_page, "line_login_step_failed")
                    .await;
            }
        }
        result
    }
}

#[async_trait]
impl LeadGate for LineGate {
    fn name(&self) -> &'static str {
        "line"
    }

    async fn apply(&self, ctx: &mut RunContext<'_>, _scenario: &Scenario) -> KensaResult<LeadOutcome> {
        let t = ctx.config.timeouts;
        let modal = Selector::css(DIALOG);
        ctx.expect_visible(&modal, t.lead_modal, "line_modal_missing")
            .await?;
        ctx.expect_visible(
            &modal.find(Selector::text(line::MODAL_TEXT)),
            t.screen,
            "line_modal_text_missing",
        )
        .await?;

        let before: HashSet<PageId> = ctx.session.pages().await?.into_iter().collect();
        self.click_trigger(ctx).await?;

        let login_page = self.find_login_page(ctx, &before).await?;
        let opts = ctx.wait(t.screen);
        let submit = Selector::css(line::LOGIN_SUBMIT);
        if !wait_visible(ctx.session, &login_page, &submit, opts).await? {
            ctx.capture("line_login_button_not_found_main").await;
            return Err(ctx.fail_on(&login_page, "line_login_button_not_found").await);
        }

        self.login(ctx, &login_page).await?;

        let screens = return_screens();
        let opts = ctx.wait(t.post_login);
        let found = wait_across_pages(
            ctx.session,
            &screens,
            &|url: &str| line::is_line_domain(url),
            opts,
        )
        .await?;
        match found {
            Some((page, screen)) => {
                tracing::info!(page = %page, screen, "returned from LINE login");
                if let Err(e) = ctx.session.bring_to_front(&page).await {
                    tracing::debug!(page = %page, error = %e, "bring_to_front failed");
                }
                Ok(LeadOutcome::Continue(page))
            }
            None => {
                if login_page != ctx.page {
                    ctx.artifacts
                        .capture(ctx.session, &login_page, "line_return_failed_line")
                        .await;
                }
                Err(ctx.fail("line_return_failed_main").await)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::artifacts::Artifacts;
    use crate::config::{Credentials, HarnessConfig, LoginPair};
    use crate::lead::{run_lead, LeadPhase};
    use crate::mock::{MockApp, MockEvent, MockNode, MockPage, MockSession, MockWorld};
    use crate::scenario::parse_scenarios;
    use tempfile::TempDir;

    const LOGIN_URL: &str = "https://access.line.me/oauth2/v2.1/login";

    /// Content whose LINE login opens in a popup and returns to the draw screen
    struct LineApp {
        form_login: bool,
        logged_in: bool,
        filled: Vec<(String, String)>,
    }

    impl LineApp {
        fn new(form_login: bool) -> Self {
            Self {
                form_login,
                logged_in: false,
                filled: Vec::new(),
            }
        }
    }

    impl MockApp for LineApp {
        fn render(&mut self, page: &MockPage) -> MockNode {
            if line::is_line_domain(&page.url) {
                let mut body = MockNode::new("body");
                if self.form_login {
                    body = body.children([
                        MockNode::new("input").attr("name", "tid"),
                        MockNode::new("input").attr("name", "tpasswd"),
                    ]);
                }
                return body.child(
                    MockNode::div().class("login-button").child(
                        MockNode::button("ログイン")
                            .attr("type", "submit")
                            .on_click("login"),
                    ),
                );
            }
            if self.logged_in {
                return MockNode::new("body").children([
                    MockNode::button("1"),
                    MockNode::button("3"),
                    MockNode::button("スタート"),
                ]);
            }
            MockNode::new("body").child(
                MockNode::div()
                    .attr("data-scope", "dialog")
                    .attr("data-part", "content")
                    .attr("role", "dialog")
                    .children([
                        MockNode::new("p").text(line::MODAL_TEXT),
                        MockNode::div()
                            .class("MuiBox-root")
                            .child(MockNode::img("/line.png", "LINEでログイン"))
                            .on_click("open_line"),
                    ]),
            )
        }

        fn handle(&mut self, event: &MockEvent, world: &mut MockWorld<'_>) {
            match event {
                MockEvent::Click { action } if action == "open_line" => {
                    world.open_page(LOGIN_URL);
                }
                MockEvent::Click { action } if action == "login" => {
                    self.logged_in = true;
                    let login = world.page().clone();
                    world.close_page(&login);
                }
                MockEvent::Fill { field, value } => self.filled.push((field.clone(), value.clone())),
                _ => {}
            }
        }
    }

    fn scenario() -> Scenario {
        parse_scenarios(
            "- {id: l1, content_type: gacha, name: n, url: 'https://example.com/g', lead_type: line, draw_count: 3}",
        )
        .unwrap()
        .remove(0)
    }

    #[test]
    fn test_trigger_candidate_order() {
        let c = trigger_candidates(true, true);
        assert_eq!(c.len(), 6);
        assert!(matches!(c[1], Selector::Parent { levels: 1, .. }));
        assert!(matches!(c[5], Selector::Parent { levels: 2, .. }));
        assert!(trigger_candidates(false, false).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_button_login_returns_to_draw_screen() {
        let tmp = TempDir::new().unwrap();
        let mut session = MockSession::new(LineApp::new(false));
        let config = HarnessConfig::new();
        let mut artifacts = Artifacts::new(tmp.path(), "l1");
        let mut ctx = RunContext::new(&mut session, &config, &mut artifacts);
        let main = ctx.page.clone();
        ctx.session.goto(&main, "https://example.com/g").await.unwrap();

        let outcome = run_lead(&mut ctx, &scenario(), LeadPhase::BeforeStart)
            .await
            .unwrap();
        assert_eq!(outcome, LeadOutcome::Continue(main));
        assert!(ctx.artifacts.captured().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_form_login_requires_credentials() {
        let tmp = TempDir::new().unwrap();
        let mut session = MockSession::new(LineApp::new(true));
        let config = HarnessConfig::new();
        let mut artifacts = Artifacts::new(tmp.path(), "l1");
        let mut ctx = RunContext::new(&mut session, &config, &mut artifacts);
        let main = ctx.page.clone();
        ctx.session.goto(&main, "https://example.com/g").await.unwrap();

        let err = run_lead(&mut ctx, &scenario(), LeadPhase::BeforeStart)
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(ctx.artifacts.captured(), ["line_env_missing".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_form_login_with_credentials() {
        let tmp = TempDir::new().unwrap();
        let mut session = MockSession::new(LineApp::new(true));
        let config = HarnessConfig::new().with_credentials(Credentials {
            line: Some(LoginPair::new("tester@example.com", "pw")),
            member: None,
        });
        let mut artifacts = Artifacts::new(tmp.path(), "l1");
        let mut ctx = RunContext::new(&mut session, &config, &mut artifacts);
        let main = ctx.page.clone();
        ctx.session.goto(&main, "https://example.com/g").await.unwrap();

        let outcome = run_lead(&mut ctx, &scenario(), LeadPhase::BeforeStart)
            .await
            .unwrap();
        assert!(matches!(outcome, LeadOutcome::Continue(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_modal_is_named_failure() {
        struct Plain;
        impl MockApp for Plain {
            fn render(&mut self, _page: &MockPage) -> MockNode {
                MockNode::new("body").text("no gate here")
            }
        }
        let tmp = TempDir::new().unwrap();
        let mut session = MockSession::new(Plain);
        let config = HarnessConfig::new();
        let mut artifacts = Artifacts::new(tmp.path(), "l1");
        let mut ctx = RunContext::new(&mut session, &config, &mut artifacts);

        let err = run_lead(&mut ctx, &scenario(), LeadPhase::BeforeStart)
            .await
            .unwrap_err();
        assert_eq!(err.condition(), Some("line_modal_missing"));
        assert!(tmp.path().join("l1/line_modal_missing.png").exists());
    }
}
