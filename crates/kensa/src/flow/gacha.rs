//! Gacha flow: Top, lead gate, optional purchase, draw, reveal, result
//! details, links, consumption and replay.

use super::{paid, result, reuse, start_lead};
use crate::context::RunContext;
use crate::driver::Selector;
use crate::identity;
use crate::labels;
use crate::lead::LeadPhase;
use crate::result::{KensaError, KensaResult};
use crate::scenario::{GachaMode, Scenario};
use crate::screen;
use crate::selectors::{gacha, DRAW_NUMBERS};
use std::collections::BTreeSet;
use std::time::Duration;

/// How long a draw or single-start screen may take after the gate
const DRAW_SCREEN_WAIT: Duration = Duration::from_secs(20);
/// How long the progress dots may take to render
const DOTS_WAIT: Duration = Duration::from_secs(8);
/// How long reveal thumbnails may take to render
const THUMBS_WAIT: Duration = Duration::from_secs(25);

/// One revealed card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardResult {
    /// Card image reference
    pub src: String,
    /// Result name from the image alt
    pub name: String,
}

/// Drive one gacha scenario to pass, fail or skip
pub async fn run_gacha(ctx: &mut RunContext<'_>, scenario: &Scenario) -> KensaResult<()> {
    let Some(draw_count) = scenario.draw_count else {
        return Err(KensaError::invalid_scenario(format!(
            "{}: gacha scenario requires draw_count",
            scenario.id
        )));
    };
    let params = &scenario.lead_params;

    let url = identity::entry_url(scenario)?;
    tracing::info!(scenario = %scenario.id, url = %url, mode = ?params.gacha_mode, draw_count, "gacha start");
    let page = ctx.page.clone();
    ctx.session.goto(&page, &url).await?;
    let top = Selector::exact_text(params.top_start_text()).first();
    let wait = ctx.config.timeouts.navigation;
    ctx.expect_visible(&top, wait, "top_start_not_visible").await?;
    ctx.safe_click(&top).await?;

    start_lead(ctx, scenario, LeadPhase::BeforeStart).await?;
    paid::purchase_if_paid(ctx, scenario).await?;

    match params.gacha_mode {
        GachaMode::Single => run_single(ctx, scenario).await,
        GachaMode::Bulk => run_bulk(ctx, scenario, draw_count).await,
    }
}

// =============================================================================
// SINGLE
// =============================================================================

async fn run_single(ctx: &mut RunContext<'_>, scenario: &Scenario) -> KensaResult<()> {
    let start = Selector::exact_text(gacha::SINGLE_START_TEXT).first();
    ctx.expect_visible(&start, DRAW_SCREEN_WAIT, "single_start_screen_not_opened")
        .await?;
    for n in DRAW_NUMBERS {
        if ctx.count(&Selector::exact_text(n.to_string())).await? > 0 {
            return Err(ctx.fail(&format!("single_should_not_show_number_{n}")).await);
        }
    }
    ctx.pause().await;
    ctx.safe_click(&start).await?;

    let details = result::extract_details(ctx, 1, "detail_rule_failed_single").await?;

    let thumbs = ctx.count(&Selector::css(gacha::TOP_THUMBS)).await?;
    ctx.ensure(thumbs == 0, "topthumb_should_not_exist_single")
        .await?;

    let links = result::extract_links(ctx, "link_rule_failed_single").await?;
    let names = result::unique_names([details[0].name.as_str()]);
    if let Some(condition) = result::link_coverage_violation(&links, &names, "_single") {
        return Err(ctx.fail(&condition).await);
    }
    result::open_links(ctx, &links).await?;

    consume(ctx, 1, &[details[0].name.clone()], "use_flow_failed_single").await?;
    reuse::check_reuse_policy(ctx, scenario).await
}

// =============================================================================
// BULK
// =============================================================================

async fn check_draw_count_screen(ctx: &mut RunContext<'_>, scenario: &Scenario, draw_count: u32) -> KensaResult<()> {
    let params = &scenario.lead_params;
    let start = Selector::exact_text(gacha::DRAW_START_TEXT);
    ctx.expect_visible(&start, DRAW_SCREEN_WAIT, "draw_count_screen_not_opened")
        .await?;

    let required = ctx.count(&Selector::exact_text(draw_count.to_string())).await?;
    ctx.ensure(required > 0, &format!("draw_count_required_missing_{draw_count}"))
        .await?;

    if let Some(expected) = &params.draw_counts_expected {
        for n in expected {
            let shown = ctx.count(&Selector::exact_text(n.to_string())).await? > 0;
            ctx.ensure(shown, &format!("draw_count_expected_missing_{n}"))
                .await?;
        }
        if params.draw_counts_strict {
            let mut present = BTreeSet::new();
            for n in DRAW_NUMBERS {
                if ctx.count(&Selector::exact_text(n.to_string())).await? > 0 {
                    present.insert(n);
                }
            }
            let wanted: BTreeSet<u32> = expected.iter().copied().collect();
            if present != wanted {
                tracing::error!(?present, ?wanted, "draw-count options differ");
                return Err(ctx.fail("draw_count_present_set_mismatch").await);
            }
        }
    }

    match ctx.first(&start).await? {
        None => Err(ctx.fail("start_button_missing").await),
        Some(button) if !button.enabled => Err(ctx.fail("start_button_disabled").await),
        Some(_) => Ok(()),
    }
}

/// Card image, name, "tap next" and "skip" on the reveal screen
async fn check_card_ui(ctx: &mut RunContext<'_>) -> KensaResult<()> {
    let card = ctx
        .first(&Selector::css(gacha::CARD_IMAGE))
        .await?
        .unwrap_or_default();
    ctx.ensure(!card.attr_or_empty("src").is_empty(), "card_image_src_missing")
        .await?;
    let name = labels::pick_result_name(card.attr_or_empty("alt"));
    ctx.ensure(name.is_some(), "card_result_name_missing_or_invalid")
        .await?;
    let tap = ctx.count(&Selector::text(gacha::CARD_TAP_NEXT_TEXT)).await?;
    ctx.ensure(tap > 0, "card_tap_next_missing").await?;
    let skip = ctx.count(&Selector::text(gacha::CARD_SKIP_TEXT)).await?;
    ctx.ensure(skip > 0, "card_skip_missing").await
}

/// Click through every card, recording image and name before each advance
async fn reveal_cards(ctx: &mut RunContext<'_>, draw_count: u32) -> KensaResult<Vec<CardResult>> {
    let card = Selector::css(gacha::CARD_IMAGE).first();
    let reveal = ctx.config.timeouts.reveal;
    let mut cards = Vec::with_capacity(draw_count as usize);
    for i in 1..=draw_count {
        let info = ctx.first(&card).await?.unwrap_or_default();
        let src = info.attr_or_empty("src").to_string();
        let Some(name) = labels::pick_result_name(info.attr_or_empty("alt")) else {
            return Err(ctx.fail(&format!("card_name_invalid_{i}")).await);
        };
        tracing::debug!(card = i, name = %name, src = %src, "card revealed");
        cards.push(CardResult {
            src: src.clone(),
            name,
        });

        ctx.pause().await;
        ctx.safe_click(&card).await?;
        if i == draw_count {
            break;
        }
        let opts = ctx.wait(reveal);
        let changed = screen::wait_attr_change(ctx.session, &ctx.page, &card, "src", &src, opts).await?;
        if changed.is_none() {
            tracing::warn!(card = i, "card image did not change");
        }
    }
    Ok(cards)
}

async fn check_thumbnails(ctx: &mut RunContext<'_>, cards: &[CardResult]) -> KensaResult<()> {
    let thumbs = Selector::css(gacha::TOP_THUMBS);
    if cards.len() < 2 {
        let count = ctx.count(&thumbs).await?;
        return ctx.ensure(count == 0, "topthumb_should_not_exist").await;
    }
    let shown = ctx.wait_visible(&thumbs.clone().first(), THUMBS_WAIT).await?;
    ctx.ensure(shown, "no_topthumb").await?;

    let srcs: Vec<String> = ctx
        .query(&thumbs)
        .await?
        .iter()
        .map(|t| t.attr_or_empty("src").to_string())
        .collect();
    ctx.ensure(srcs.len() == cards.len(), "topthumb_count_mismatch")
        .await?;
    let in_order = srcs.iter().zip(cards).all(|(thumb, card)| *thumb == card.src);
    ctx.ensure(in_order, "topthumb_order_mismatch").await
}

async fn run_bulk(ctx: &mut RunContext<'_>, scenario: &Scenario, draw_count: u32) -> KensaResult<()> {
    let t = ctx.config.timeouts;
    check_draw_count_screen(ctx, scenario, draw_count).await?;
    ctx.pause().await;
    ctx.safe_click(&Selector::exact_text(draw_count.to_string()).first())
        .await?;
    ctx.safe_click(&Selector::exact_text(gacha::DRAW_START_TEXT).first())
        .await?;

    let card_shown = ctx
        .wait_visible(&Selector::css(gacha::CARD_IMAGE).first(), t.slow_screen)
        .await?;
    ctx.ensure(card_shown, "no_card").await?;
    check_card_ui(ctx).await?;

    let dots = Selector::css(gacha::DOT_BUTTONS);
    ctx.wait_visible(&dots.clone().first(), DOTS_WAIT).await?;
    let dot_count = ctx.count(&dots).await?;
    ctx.ensure(dot_count == draw_count as usize, "dot_count_mismatch")
        .await?;

    let cards = reveal_cards(ctx, draw_count).await?;
    check_thumbnails(ctx, &cards).await?;

    let details = result::extract_details(ctx, draw_count, "detail_rule_failed").await?;
    for (i, (detail, card)) in details.iter().zip(&cards).enumerate() {
        let k = i + 1;
        if detail.image_src != card.src {
            return Err(ctx.fail(&format!("detail_img_src_mismatch_{k}")).await);
        }
        if detail.name != card.name {
            return Err(ctx.fail(&format!("detail_name_mismatch_{k}")).await);
        }
    }

    let links = result::extract_links(ctx, "link_rule_failed").await?;
    let names = result::unique_names(cards.iter().map(|c| c.name.as_str()));
    if let Some(condition) = result::link_coverage_violation(&links, &names, "") {
        return Err(ctx.fail(&condition).await);
    }
    result::open_links(ctx, &links).await?;

    let detail_names: Vec<String> = details.into_iter().map(|d| d.name).collect();
    consume(ctx, draw_count, &detail_names, "use_flow_failed").await?;
    reuse::check_reuse_policy(ctx, scenario).await
}

/// Consumption over the result blocks; a failure also records `condition`
pub(super) async fn consume(
    ctx: &mut RunContext<'_>,
    draw_count: u32,
    names: &[String],
    condition: &str,
) -> KensaResult<()> {
    let blocks = gacha::detail_blocks(draw_count);
    match result::consume_all(ctx, &blocks, names).await {
        Ok(()) => Ok(()),
        Err(e) => {
            ctx.capture(condition).await;
            Err(e)
        }
    }
}
