//! Diagnose flow: Top, three questions with branch checks, result confirm,
//! result verification and replay.

use super::gacha::consume;
use super::{result, reuse, start_lead};
use crate::context::RunContext;
use crate::driver::Selector;
use crate::identity;
use crate::lead::LeadPhase;
use crate::result::{KensaError, KensaResult};
use crate::scenario::{Answer, DiagnoseType, Scenario};
use crate::scoring;
use crate::selectors::diagnose;
use std::time::Duration;

/// How long Top and each question may take to show
const QUESTION_WAIT: Duration = Duration::from_secs(20);
/// How long the result-confirm screen may take to show
const CONFIRM_WAIT: Duration = Duration::from_secs(25);

/// Header, index and image of question `n`
async fn check_question(ctx: &mut RunContext<'_>, n: u8) -> KensaResult<()> {
    let header = ctx
        .wait_visible(&Selector::exact_text(diagnose::QUESTION_LABEL_TEXT), QUESTION_WAIT)
        .await?
        && ctx
            .wait_visible(&Selector::exact_text(n.to_string()), QUESTION_WAIT)
            .await?;
    ctx.ensure(header, &format!("diagnose_q{n}_header_missing"))
        .await?;
    let image = ctx.count(&Selector::css(diagnose::QUESTION_IMAGE)).await?;
    ctx.ensure(image > 0, &format!("diagnose_q{n}_image_missing"))
        .await
}

/// Click the answer label carrying `text`
async fn choose(ctx: &mut RunContext<'_>, text: &str) -> KensaResult<()> {
    let label = Selector::css(diagnose::ANSWER_LABEL).has_text(text).first();
    if ctx.count(&label).await? == 0 {
        return Err(ctx.fail(&format!("diagnose_single_answer_not_found_{text}")).await);
    }
    ctx.pause().await;
    if ctx.safe_click(&label).await.is_err() {
        return Err(ctx
            .fail(&format!("diagnose_single_answer_click_failed_{text}"))
            .await);
    }
    Ok(())
}

async fn has_text(ctx: &mut RunContext<'_>, text: &str) -> KensaResult<bool> {
    Ok(ctx.count(&Selector::text(text)).await? > 0)
}

/// Drive one diagnose scenario to pass, fail or skip
pub async fn run_diagnose(ctx: &mut RunContext<'_>, scenario: &Scenario) -> KensaResult<()> {
    let params = &scenario.lead_params;
    let Some(answers) = params.answers.as_ref() else {
        return Err(KensaError::invalid_scenario(format!(
            "{}: diagnose scenario requires lead_params.answers",
            scenario.id
        )));
    };
    let branch = &params.branch_expected;

    let url = identity::with_random_user_id(&scenario.url)?;
    tracing::info!(scenario = %scenario.id, url = %url, "diagnose start");
    let page = ctx.page.clone();
    ctx.session.goto(&page, &url).await?;
    let start = Selector::exact_text(diagnose::START_TEXT).first();
    ctx.expect_visible(&start, QUESTION_WAIT, "diagnose_top_not_opened")
        .await?;
    ctx.safe_click(&start).await?;

    start_lead(ctx, scenario, LeadPhase::BeforeStart).await?;

    check_question(ctx, 1).await?;
    let q1_marker = has_text(ctx, diagnose::FIRST_QUESTION_TEXT).await?;
    ctx.ensure(q1_marker, "diagnose_q1_text_missing").await?;
    choose(ctx, &answers.q1).await?;

    check_question(ctx, 2).await?;
    if let Some(text) = &branch.q2_text {
        let shown = has_text(ctx, text).await?;
        ctx.ensure(shown, "diagnose_branch_q2_mismatch").await?;
    }
    choose(ctx, &answers.q2).await?;

    check_question(ctx, 3).await?;
    if let Some(text) = &branch.q3_text {
        let shown = has_text(ctx, text).await?;
        ctx.ensure(shown, "diagnose_branch_q3_mismatch").await?;
    }
    let multi_marker = Selector::exact_text(diagnose::MULTI_LABEL_TEXT);
    if branch.q3_multi {
        let multi = ctx.count(&multi_marker).await? > 0;
        ctx.ensure(multi, "diagnose_branch_q3_should_be_multi")
            .await?;
    }
    match &answers.q3 {
        Answer::One(text) => choose(ctx, text).await?,
        Answer::Many(texts) => {
            let next = Selector::exact_text(diagnose::NEXT_TEXT).first();
            let ui = ctx.wait_visible(&multi_marker, QUESTION_WAIT).await?
                && ctx.wait_visible(&next, QUESTION_WAIT).await?;
            ctx.ensure(ui, "diagnose_multi_ui_missing").await?;
            for text in texts {
                choose(ctx, text).await?;
            }
            ctx.safe_click(&next).await?;
        }
    }

    let result_button = Selector::exact_text(diagnose::RESULT_TEXT).first();
    let confirm = ctx
        .wait_visible(&Selector::text(diagnose::RESULT_CONFIRM_TEXT), CONFIRM_WAIT)
        .await?
        && ctx.wait_visible(&result_button, CONFIRM_WAIT).await?
        && ctx
            .wait_visible(&Selector::exact_text(diagnose::BACK_TO_ANSWERS_TEXT), CONFIRM_WAIT)
            .await?;
    ctx.ensure(confirm, "diagnose_result_confirm_screen_missing")
        .await?;
    ctx.pause().await;
    ctx.safe_click(&result_button).await?;

    start_lead(ctx, scenario, LeadPhase::BeforeResult).await?;

    let details = result::extract_details(ctx, 1, "diagnose_detail_rule_failed").await?;
    let actual = details[0].name.clone();
    check_scoring(ctx, scenario, &actual).await?;

    let links = result::extract_links(ctx, "diagnose_link_rule_failed").await?;
    result::open_links(ctx, &links).await?;

    consume(ctx, 1, &[actual], "diagnose_use_flow_failed").await?;
    reuse::check_reuse_policy(ctx, scenario).await
}

/// Compare the displayed result with the scored expectation, if any
async fn check_scoring(ctx: &mut RunContext<'_>, scenario: &Scenario, actual: &str) -> KensaResult<()> {
    let params = &scenario.lead_params;
    let (Some(kind), Some(expected)) = (params.diagnose_type, scoring::expected_result(params)) else {
        return Ok(());
    };
    if expected == actual {
        tracing::info!(result = %actual, "scored result matches");
        return Ok(());
    }
    let mode = match kind {
        DiagnoseType::AxisPoint => "axis",
        DiagnoseType::Additive => "additive",
    };
    let condition = format!("diagnose_{mode}_result_mismatch_actual_{actual}_expected_{expected}");
    Err(ctx.fail(&condition).await)
}
