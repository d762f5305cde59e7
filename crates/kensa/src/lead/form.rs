//! First-party lead form
//!
//! The form must render every field type, mark email, text and phone as
//! required, refuse an empty submit with inline errors, and accept a filled
//! submit.

use super::{LeadGate, LeadOutcome};
use crate::context::RunContext;
use crate::driver::Selector;
use crate::result::KensaResult;
use crate::scenario::Scenario;
use crate::selectors::form;
use async_trait::async_trait;
use std::time::Duration;

/// How long an empty submit is watched for an unwanted navigation
pub const NO_NAVIGATION_WINDOW: Duration = Duration::from_millis(1500);

/// Required controls, by label
const REQUIRED_LABELS: [&str; 3] = [form::EMAIL_LABEL, form::TEXT_LABEL, form::PHONE_LABEL];

/// Custom lead form
#[derive(Debug, Clone, Copy, Default)]
pub struct FormGate;

fn control(label: &str) -> Selector {
    Selector::css(form::FORM_CONTROL).has_text(label).first()
}

fn submit_button() -> Selector {
    Selector::any([
        Selector::css("button").has_text(form::SUBMIT_TEXT),
        Selector::css("[role='button']").has_text(form::SUBMIT_TEXT),
    ])
    .first()
}

impl FormGate {
    async fn fields_present(&self, ctx: &mut RunContext<'_>) -> KensaResult<bool> {
        let wait = ctx.config.timeouts.screen;
        for label in [form::EMAIL_LABEL, form::TEXT_LABEL] {
            if !ctx.wait_visible(&control(label), wait).await? {
                tracing::error!(label, "form control not visible");
                return Ok(false);
            }
        }
        if !ctx.wait_visible(&Selector::css(form::PHONE_PARTS[0]), wait).await? {
            return Ok(false);
        }
        for css in [
            form::RADIO_GROUP,
            form::CHECKBOX_ROOT,
            form::SELECT_ROOT,
            form::FILE_UPLOAD_ROOT,
        ] {
            if ctx.count(&Selector::css(css)).await? == 0 {
                tracing::error!(selector = css, "form field type missing");
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn fill_required(&self, ctx: &mut RunContext<'_>) -> KensaResult<()> {
        let data = ctx.config.form_data.clone();
        let input = Selector::css(form::TEXT_INPUT);
        ctx.session
            .fill(&ctx.page, &control(form::EMAIL_LABEL).find(input.clone()), &data.email)
            .await?;
        ctx.session
            .fill(&ctx.page, &control(form::TEXT_LABEL).find(input), &data.text)
            .await?;
        for (css, value) in form::PHONE_PARTS.iter().zip(data.phone.iter()) {
            ctx.session.fill(&ctx.page, &Selector::css(*css), value).await?;
        }
        Ok(())
    }

    /// Pick the first non-empty dropdown option
    async fn choose_dropdown(&self, ctx: &mut RunContext<'_>) -> KensaResult<()> {
        let options = ctx
            .query(&Selector::css(form::SELECT).first().find(Selector::css("option")))
            .await?;
        let chosen = options
            .iter()
            .map(|o| o.attr_or_empty("value"))
            .find(|v| !v.is_empty())
            .map(str::to_string);
        if let Some(value) = chosen {
            ctx.session
                .select_option(&ctx.page, &Selector::css(form::SELECT).first(), &value)
                .await?;
        }
        Ok(())
    }

    /// Click the first item of a toggle group unless already checked, then
    /// require its inner input to be checked
    async fn toggle_first(
        &self,
        ctx: &mut RunContext<'_>,
        item_css: &str,
        input_type: &str,
    ) -> KensaResult<bool> {
        let item = Selector::css(item_css).first();
        let Some(info) = ctx.first(&item).await? else {
            return Ok(false);
        };
        if info.attr_or_empty("data-state") != "checked" {
            ctx.safe_click(&item).await?;
        }
        let inner = item.find(Selector::css(format!("input[type='{input_type}']")));
        Ok(match ctx.first(&inner).await? {
            Some(input) => input.checked,
            None => true,
        })
    }
}

#[async_trait]
impl LeadGate for FormGate {
    fn name(&self) -> &'static str {
        "form"
    }

    async fn apply(&self, ctx: &mut RunContext<'_>, _scenario: &Scenario) -> KensaResult<LeadOutcome> {
        let t = ctx.config.timeouts;
        for marker in [
            Selector::text(form::HEADING_TEXT_PRIMARY),
            Selector::text(form::HEADING_TEXT_SECONDARY),
            Selector::text(form::SUBMIT_TEXT),
        ] {
            ctx.expect_visible(&marker, t.slow_screen, "form_screen_not_visible")
                .await?;
        }

        let present = self.fields_present(ctx).await?;
        ctx.ensure(present, "form_fields_missing").await?;

        for label in REQUIRED_LABELS {
            let badge = control(label).find(Selector::text(form::REQUIRED_BADGE_TEXT));
            let found = ctx.count(&badge).await? > 0;
            if !found {
                tracing::error!(label, "required badge missing");
                return Err(ctx.fail("form_required_badge_missing").await);
            }
        }

        let submit = submit_button();
        let submit_found = ctx.count(&submit).await? > 0;
        ctx.ensure(submit_found, "form_submit_not_found").await?;

        // Empty submit: inline errors, no navigation.
        if ctx.safe_click(&submit).await.is_err() {
            return Err(ctx.fail("form_submit_click_failed").await);
        }
        ctx.pause().await;
        for label in REQUIRED_LABELS {
            let error = control(label).find(Selector::text(form::REQUIRED_ERROR_TEXT));
            if !ctx.wait_visible(&error, t.inline_errors).await? {
                tracing::error!(label, "required error not shown");
                return Err(ctx.fail("form_required_error_not_shown").await);
            }
        }
        let navigated = ctx
            .wait_visible(&Selector::exact_text("1"), NO_NAVIGATION_WINDOW)
            .await?;
        if navigated {
            return Err(ctx.fail("form_should_not_navigate_on_error").await);
        }

        if let Err(e) = self.fill_required(ctx).await {
            tracing::error!(error = %e, "filling required fields failed");
            return Err(ctx.fail("form_fill_failed").await);
        }
        if let Err(e) = self.choose_dropdown(ctx).await {
            tracing::error!(error = %e, "dropdown selection failed");
            return Err(ctx.fail("form_select_failed").await);
        }
        if !self.toggle_first(ctx, form::CHECKBOX_ROOT, "checkbox").await? {
            return Err(ctx.fail("form_checkbox_not_checked").await);
        }
        if !self.toggle_first(ctx, form::RADIO_ITEM, "radio").await? {
            return Err(ctx.fail("form_radio_not_checked").await);
        }

        if ctx.safe_click(&submit).await.is_err() {
            return Err(ctx.fail("form_submit_click_failed").await);
        }
        Ok(LeadOutcome::Continue(ctx.page.clone()))
    }
}
