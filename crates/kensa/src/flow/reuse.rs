//! Replay rules
//!
//! After consumption the flow returns to Top with the play-again control and
//! starts once more. What happens next (an "already used" notice, or the
//! content proceeding) is checked against the scenario's reuse policy. A
//! used notice is always followed by a fresh user id that must proceed.

use crate::context::RunContext;
use crate::driver::Selector;
use crate::identity;
use crate::result::KensaResult;
use crate::scenario::{LeadParams, ReusePolicy, Scenario, UsedToastType};
use crate::screen::{self, Probe, Screen};
use crate::selectors::{diagnose, embed, form, gacha, line, paid, sns, DIALOG, TOAST_TITLE};
use std::time::Duration;

/// How long Top may take to come back
const TOP_RETURN_WAIT: Duration = Duration::from_secs(20);

/// What a start attempt led to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// The "already used" notice appeared
    Used,
    /// A gate, question or draw screen appeared
    Proceed,
    /// Neither within the budget
    Unknown,
}

/// Screens that show the content accepted a start, in probe order
///
/// A paid gacha proceeds to its order page rather than the draw screen.
#[must_use]
pub fn proceed_screens() -> Vec<Screen> {
    vec![
        Screen::new("line_modal", Probe::css_with_text(DIALOG, line::MODAL_TEXT)),
        Screen::new("sns_modal", Probe::css_with_text(DIALOG, sns::MODAL_TEXT)),
        Screen::new("form", Probe::text(form::HEADING_TEXT_PRIMARY)),
        Screen::new(
            "embed_form",
            Probe::in_frame(embed::IFRAME, Selector::css(embed::SUBMIT)),
        ),
        Screen::new("paid_order", Probe::text(paid::CONFIRM_TITLE_TEXT)),
        Screen::new("paid_login", Probe::text(paid::MEMBER_LOGIN_TITLE_TEXT)),
        Screen::new(
            "single_start",
            Probe::Visible(Selector::exact_text(gacha::SINGLE_START_TEXT)),
        ),
        Screen::all(
            "question",
            [
                Probe::Visible(Selector::exact_text(diagnose::QUESTION_LABEL_TEXT)),
                Probe::Visible(Selector::exact_text("1")),
            ],
        ),
        Screen::new("draw_count", Probe::Visible(Selector::exact_text("1"))),
    ]
}

/// Title of the notice a consumed identity gets
fn used_toast(params: &LeadParams) -> Selector {
    let text = match params.used_toast_type {
        UsedToastType::Multi => gacha::TOAST_USED_DAILY,
        UsedToastType::Once => gacha::TOAST_USED_ONCE,
    };
    Selector::css(TOAST_TITLE).has_text(text)
}

/// Press the Top start control and classify the reaction
pub async fn attempt_start(ctx: &mut RunContext<'_>, params: &LeadParams) -> KensaResult<Attempt> {
    let t = ctx.config.timeouts;
    ctx.pause().await;
    ctx.safe_click(&Selector::exact_text(params.top_start_text()).first())
        .await?;

    if ctx.wait_visible(&used_toast(params), t.toast).await? {
        tracing::info!("start attempt: already used");
        return Ok(Attempt::Used);
    }
    let opts = ctx.wait(t.proceed);
    let screens = proceed_screens();
    match screen::wait_for(ctx.session, &ctx.page, &screens, opts).await? {
        Some(name) => {
            tracing::info!(screen = name, "start attempt: proceeded");
            Ok(Attempt::Proceed)
        }
        None => {
            tracing::warn!("start attempt: no notice and no next screen");
            Ok(Attempt::Unknown)
        }
    }
}

/// Click play-again and wait for Top; named conditions on failure
pub async fn play_again(ctx: &mut RunContext<'_>, params: &LeadParams) -> KensaResult<()> {
    let button = gacha::play_again().first();
    if ctx.count(&button).await? == 0 {
        return Err(ctx.fail("play_again_missing").await);
    }
    ctx.pause().await;
    ctx.safe_click(&button).await?;
    wait_top(ctx, params).await
}

async fn wait_top(ctx: &mut RunContext<'_>, params: &LeadParams) -> KensaResult<()> {
    let top = Selector::exact_text(params.top_start_text());
    if ctx.wait_visible(&top, TOP_RETURN_WAIT).await? {
        Ok(())
    } else {
        let condition = format!("top_not_returned_{}", params.top_start_text());
        Err(ctx.fail(&condition).await)
    }
}

/// Back to Top after a proceeding attempt
///
/// Screens reached by a start rarely offer play-again, so the same address
/// (same user id) is loaded again when the control is missing.
async fn return_to_top(ctx: &mut RunContext<'_>, params: &LeadParams, top_url: &str) -> KensaResult<()> {
    if ctx.count(&gacha::play_again()).await? > 0 {
        return play_again(ctx, params).await;
    }
    tracing::debug!(url = %top_url, "no play-again control, reloading Top");
    let page = ctx.page.clone();
    ctx.session.goto(&page, top_url).await?;
    wait_top(ctx, params).await
}

/// Load the content under a fresh user id; the start must proceed
async fn fresh_identity_proceeds(ctx: &mut RunContext<'_>, scenario: &Scenario) -> KensaResult<()> {
    let params = &scenario.lead_params;
    ctx.pause().await;
    let url = identity::with_random_user_id(&scenario.url)?;
    let page = ctx.page.clone();
    ctx.session.goto(&page, &url).await?;
    let top = Selector::exact_text(params.top_start_text());
    if !ctx.wait_visible(&top, TOP_RETURN_WAIT).await? {
        return Err(ctx.fail("userid_random_top_not_visible").await);
    }
    let attempt = attempt_start(ctx, params).await?;
    ctx.ensure(attempt == Attempt::Proceed, "userid_random_still_blocked")
        .await
}

/// Return to Top and check the scenario's reuse policy
pub async fn check_reuse_policy(ctx: &mut RunContext<'_>, scenario: &Scenario) -> KensaResult<()> {
    let params = &scenario.lead_params;
    play_again(ctx, params).await?;
    let top_url = ctx.session.url(&ctx.page).await?;
    tracing::info!(scenario = %scenario.id, policy = ?params.reuse_policy, "checking reuse policy");

    match params.reuse_policy {
        ReusePolicy::MustUsed => {
            let attempt = attempt_start(ctx, params).await?;
            ctx.ensure(attempt == Attempt::Used, "must_used_but_not_used").await?;
            fresh_identity_proceeds(ctx, scenario).await
        }
        ReusePolicy::MustReusable => match attempt_start(ctx, params).await? {
            Attempt::Proceed => Ok(()),
            Attempt::Used => Err(ctx.fail("must_reusable_but_used").await),
            Attempt::Unknown => Err(ctx.fail("must_reusable_but_cannot_proceed").await),
        },
        ReusePolicy::UsedAfterN => {
            let allowed = params.reuse_allowed_times.unwrap_or(0);
            if allowed == 0 {
                return Err(ctx.fail("used_after_n_missing_allowed_times").await);
            }
            for k in 1..=allowed {
                match attempt_start(ctx, params).await? {
                    Attempt::Proceed => {}
                    Attempt::Used => return Err(ctx.fail(&format!("used_too_early_at_{k}")).await),
                    Attempt::Unknown => {
                        return Err(ctx.fail(&format!("cannot_proceed_at_{k}")).await);
                    }
                }
                if return_to_top(ctx, params, &top_url).await.is_err() {
                    return Err(ctx.fail(&format!("play_again_failed_at_{k}")).await);
                }
            }
            let attempt = attempt_start(ctx, params).await?;
            let condition = format!("used_after_n_but_not_used_at_{}", allowed + 1);
            ctx.ensure(attempt == Attempt::Used, &condition).await?;
            fresh_identity_proceeds(ctx, scenario).await
        }
        ReusePolicy::Either => match attempt_start(ctx, params).await? {
            Attempt::Proceed => Ok(()),
            Attempt::Used => fresh_identity_proceeds(ctx, scenario).await,
            Attempt::Unknown => Err(ctx.fail("neither_toast_nor_drawcount").await),
        },
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
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    /// Top page that lets each user id start `allowed` times
    struct Replay {
        allowed: u32,
        starts: BTreeMap<String, u32>,
        screen: &'static str,
        toast: bool,
        /// First navigation lands on the result screen of a finished play
        finished_play: bool,
        /// Fresh per-run user ids land on a maintenance page
        fresh_down: bool,
    }

    impl Replay {
        fn new(allowed: u32) -> Self {
            Self {
                allowed,
                starts: BTreeMap::from([("fixed".to_string(), 1)]),
                screen: "top",
                toast: false,
                finished_play: true,
                fresh_down: false,
            }
        }
    }

    fn user(url: &str) -> String {
        url::Url::parse(url)
            .ok()
            .and_then(|u| {
                u.query_pairs()
                    .find(|(k, _)| k == "userid")
                    .map(|(_, v)| v.to_string())
            })
            .unwrap_or_default()
    }

    impl MockApp for Replay {
        fn render(&mut self, _page: &MockPage) -> MockNode {
            let mut body = MockNode::new("body");
            if self.toast {
                body = body.child(
                    MockNode::div()
                        .attr("data-scope", "toast")
                        .attr("data-part", "title")
                        .text(gacha::TOAST_USED_DAILY),
                );
            }
            match self.screen {
                "result" => body.child(MockNode::button(gacha::PLAY_AGAIN_TEXT).on_click("again")),
                "top" => body.child(MockNode::button(gacha::START_GACHA_TEXT).on_click("start")),
                "down" => body.child(MockNode::div().text("メンテナンス中")),
                _ => body.children([MockNode::button("1"), MockNode::button("3")]),
            }
        }

        fn handle(&mut self, event: &MockEvent, world: &mut MockWorld<'_>) {
            match event {
                MockEvent::Navigate { url } => {
                    self.screen = if std::mem::take(&mut self.finished_play) {
                        "result"
                    } else if self.fresh_down && user(url).starts_with("e2e_") {
                        "down"
                    } else {
                        "top"
                    };
                    self.toast = false;
                }
                MockEvent::Click { action } if action == "again" => self.screen = "top",
                MockEvent::Click { action } if action == "start" => {
                    let used = self.starts.entry(user(world.url())).or_insert(0);
                    if *used >= self.allowed {
                        self.toast = true;
                    } else {
                        *used += 1;
                        self.screen = "draw";
                    }
                }
                _ => {}
            }
        }
    }

    fn scenario(params: &str) -> Scenario {
        let yaml = format!(
            "- {{id: r1, content_type: gacha, name: n, url: 'https://example.com/g?userid=fixed', \
             lead_type: none, draw_count: 1, lead_params: {{{params}}}}}"
        );
        parse_scenarios(&yaml).unwrap().remove(0)
    }

    /// Run the policy check from the result screen of user `fixed`, who has
    /// already started once
    async fn check(allowed: u32, params: &str) -> (KensaResult<()>, Vec<String>) {
        check_with(Replay::new(allowed), params).await
    }

    async fn check_with(app: Replay, params: &str) -> (KensaResult<()>, Vec<String>) {
        let tmp = TempDir::new().unwrap();
        let sc = scenario(params);
        let mut session = MockSession::new(app);
        let config = HarnessConfig::new();
        let mut artifacts = Artifacts::new(tmp.path(), "r1");
        let result = {
            let mut ctx = RunContext::new(&mut session, &config, &mut artifacts);
            let page = ctx.page.clone();
            ctx.session.goto(&page, &sc.url).await.unwrap();
            check_reuse_policy(&mut ctx, &sc).await
        };
        (result, artifacts.captured().to_vec())
    }

    #[test]
    fn test_proceed_screen_order() {
        let names: Vec<_> = proceed_screens().iter().map(|s| s.name).collect();
        assert_eq!(names.first(), Some(&"line_modal"));
        assert_eq!(names.last(), Some(&"draw_count"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_classification() {
        let tmp = TempDir::new().unwrap();
        let mut app = Replay::new(1);
        app.finished_play = false;
        let mut session = MockSession::new(app);
        let config = HarnessConfig::new();
        let mut artifacts = Artifacts::new(tmp.path(), "r1");
        let mut ctx = RunContext::new(&mut session, &config, &mut artifacts);
        let page = ctx.page.clone();
        let params = LeadParams::default();

        ctx.session.goto(&page, "https://example.com/g?userid=u1").await.unwrap();
        assert_eq!(attempt_start(&mut ctx, &params).await.unwrap(), Attempt::Proceed);
        ctx.session.goto(&page, "https://example.com/g?userid=u1").await.unwrap();
        assert_eq!(attempt_start(&mut ctx, &params).await.unwrap(), Attempt::Used);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_again_missing() {
        let tmp = TempDir::new().unwrap();
        let mut app = Replay::new(1);
        app.finished_play = false;
        let mut session = MockSession::new(app);
        let config = HarnessConfig::new();
        let mut artifacts = Artifacts::new(tmp.path(), "r1");
        let mut ctx = RunContext::new(&mut session, &config, &mut artifacts);
        let page = ctx.page.clone();
        ctx.session.goto(&page, "https://example.com/g").await.unwrap();
        let err = play_again(&mut ctx, &LeadParams::default()).await.unwrap_err();
        assert_eq!(err.condition(), Some("play_again_missing"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_must_used_then_fresh_identity() {
        let (result, captured) = check(1, "reuse_policy: must_used").await;
        result.unwrap();
        assert!(captured.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_identity_without_top_screen() {
        let app = Replay {
            fresh_down: true,
            ..Replay::new(1)
        };
        let (result, captured) = check_with(app, "reuse_policy: must_used").await;
        assert_eq!(
            result.unwrap_err().condition(),
            Some("userid_random_top_not_visible")
        );
        assert_eq!(captured, vec!["userid_random_top_not_visible".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_must_used_but_proceeds() {
        let (result, _) = check(5, "reuse_policy: must_used").await;
        assert_eq!(result.unwrap_err().condition(), Some("must_used_but_not_used"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_must_reusable() {
        let (result, _) = check(5, "reuse_policy: must_reusable").await;
        result.unwrap();
        let (result, _) = check(1, "reuse_policy: must_reusable").await;
        assert_eq!(result.unwrap_err().condition(), Some("must_reusable_but_used"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_used_after_n() {
        // one start already made, two more allowed
        let (result, _) = check(3, "reuse_policy: used_after_n, reuse_allowed_times: 2").await;
        result.unwrap();

        let (result, _) = check(2, "reuse_policy: used_after_n, reuse_allowed_times: 2").await;
        assert_eq!(result.unwrap_err().condition(), Some("used_too_early_at_2"));

        let (result, _) = check(9, "reuse_policy: used_after_n, reuse_allowed_times: 2").await;
        assert_eq!(
            result.unwrap_err().condition(),
            Some("used_after_n_but_not_used_at_3")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_either_accepts_both() {
        let (result, _) = check(1, "reuse_policy: either").await;
        result.unwrap();
        let (result, _) = check(5, "reuse_policy: either").await;
        result.unwrap();
    }
}
