//! Paid purchase detour
//!
//! A paid gacha routes the start through an order page: an optional member
//! login, then a confirmation screen with fixed price lines, a quantity
//! select, terms and the purchase button. After purchase only the bought
//! quantity may be pressed on the draw-count screen.

use crate::context::RunContext;
use crate::driver::{ClickOptions, Selector};
use crate::result::KensaResult;
use crate::scenario::Scenario;
use crate::screen::{self, Probe, Screen};
use crate::selectors::{gacha, paid, DRAW_NUMBERS};

const CONFIRM: &str = "confirm";
const LOGIN: &str = "login";

fn order_screens() -> Vec<Screen> {
    vec![
        Screen::new(CONFIRM, Probe::text(paid::CONFIRM_TITLE_TEXT)),
        Screen::new(LOGIN, Probe::text(paid::MEMBER_LOGIN_TITLE_TEXT)),
    ]
}

fn login_button() -> Selector {
    Selector::css("button").has_text(paid::LOGIN_TEXT).first()
}

fn buy_button() -> Selector {
    Selector::css("button").has_text(paid::BUY_TEXT).first()
}

/// Run the detour when the scenario is a paid gacha
pub async fn purchase_if_paid(ctx: &mut RunContext<'_>, scenario: &Scenario) -> KensaResult<()> {
    if !scenario.lead_params.paid_gacha {
        return Ok(());
    }
    let quantity = scenario
        .lead_params
        .purchase_draw_count(scenario.draw_count);
    tracing::info!(scenario = %scenario.id, quantity, "paid detour");

    let opts = ctx.wait(ctx.config.timeouts.paid_ready);
    let screens = order_screens();
    let reached = screen::wait_for(ctx.session, &ctx.page, &screens, opts).await?;
    match reached {
        None => return Err(ctx.fail("paid_loading_timeout").await),
        Some(LOGIN) => member_login(ctx).await?,
        Some(_) => {}
    }
    purchase(ctx, quantity).await
}

async fn member_login(ctx: &mut RunContext<'_>) -> KensaResult<()> {
    let member = match ctx.config.credentials.require_member() {
        Ok(member) => member.clone(),
        Err(e) => {
            ctx.capture("paid_member_env_missing").await;
            return Err(e);
        }
    };
    let t = ctx.config.timeouts;
    let email = Selector::css(paid::MEMBER_EMAIL).first();
    let password = Selector::css(paid::MEMBER_PASSWORD).first();

    let inputs_shown = ctx.wait_visible(&email, t.screen).await?
        && ctx.wait_visible(&password, t.screen).await?;
    if !inputs_shown {
        return Err(ctx.fail("paid_member_login_failed").await);
    }
    let submitted = async {
        ctx.session.fill(&ctx.page, &email, &member.email).await?;
        ctx.session.fill(&ctx.page, &password, &member.password).await?;
        ctx.safe_click(&login_button()).await
    }
    .await;
    if let Err(e) = submitted {
        tracing::error!(error = %e, "member login failed");
        return Err(ctx.fail("paid_member_login_failed").await);
    }
    let confirmed = ctx
        .wait_visible(&Selector::text(paid::CONFIRM_TITLE_TEXT), t.slow_screen)
        .await?;
    ctx.ensure(confirmed, "paid_member_login_failed").await
}

async fn purchase(ctx: &mut RunContext<'_>, quantity: u32) -> KensaResult<()> {
    let t = ctx.config.timeouts;
    ctx.expect_visible(
        &Selector::text(paid::CONFIRM_TITLE_TEXT),
        t.slow_screen,
        "paid_confirm_not_visible",
    )
    .await?;

    for (label, amount, condition) in paid::PRICE_LINES {
        let shown = ctx.count(&Selector::text(label)).await? > 0
            && ctx.count(&Selector::text(amount)).await? > 0;
        ctx.ensure(shown, condition).await?;
    }

    let select = Selector::css(paid::QUANTITY_SELECT).first();
    let selected = ctx
        .session
        .select_option(&ctx.page, &select, &quantity.to_string())
        .await;
    if let Err(e) = selected {
        tracing::error!(error = %e, quantity, "quantity select failed");
        return Err(ctx.fail("paid_select_drawcount_failed").await);
    }

    let terms = Selector::css(paid::TERMS_CHECKBOX).first();
    if ctx.count(&terms).await? > 0 {
        let clicked = ctx
            .session
            .click(&ctx.page, &terms, ClickOptions::forced())
            .await;
        if clicked.is_err() {
            return Err(ctx.fail("paid_checkbox_click_failed").await);
        }
    }

    ctx.expect_visible(&buy_button(), t.screen, "paid_buy_button_missing")
        .await?;
    ctx.pause().await;
    if ctx.safe_click(&buy_button()).await.is_err() {
        return Err(ctx.fail("paid_buy_button_click_failed").await);
    }

    let draw_screen = ctx
        .wait_visible(&Selector::exact_text(gacha::DRAW_START_TEXT), t.slow_screen)
        .await?
        && ctx
            .wait_visible(&Selector::exact_text(quantity.to_string()), t.slow_screen)
            .await?;
    ctx.ensure(draw_screen, "paid_after_buy_no_drawcount").await?;

    for n in DRAW_NUMBERS {
        let Some(button) = ctx
            .first(&Selector::css(paid::count_button(n)))
            .await?
        else {
            continue;
        };
        if n == quantity && !button.enabled {
            return Err(ctx.fail("paid_target_btn_disabled").await);
        }
        if n != quantity && button.enabled {
            return Err(ctx.fail(&format!("paid_other_btn_not_disabled_{n}")).await);
        }
    }
    tracing::info!(quantity, "purchase completed");
    Ok(())
}
