//! Third-party form embedded in an iframe

use super::{LeadGate, LeadOutcome};
use crate::context::RunContext;
use crate::driver::{ClickOptions, Selector};
use crate::result::KensaResult;
use crate::scenario::Scenario;
use crate::selectors::embed;
use async_trait::async_trait;
use tokio::time::{sleep, Instant};

/// Embedded (iframe) lead form
///
/// A CAPTCHA failure after submitting is an environment limit, so the gate
/// reports a skip instead of a failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbedFormGate;

fn iframe() -> Selector {
    Selector::css(embed::IFRAME).first()
}

fn in_frame(inner: Selector) -> Selector {
    iframe().frame(inner)
}

fn input(name: &str) -> Selector {
    in_frame(Selector::css(format!("input[name='{name}']")).first())
}

impl EmbedFormGate {
    async fn submit(&self, ctx: &mut RunContext<'_>) -> KensaResult<()> {
        let submit = in_frame(Selector::css(embed::SUBMIT).first());
        ctx.session
            .click(&ctx.page, &submit, ClickOptions::forced())
            .await
    }

    async fn fill_required(&self, ctx: &mut RunContext<'_>) -> KensaResult<()> {
        for (name, value) in embed::FIELDS {
            ctx.session.fill(&ctx.page, &input(name), value).await?;
        }
        let email = ctx.config.form_data.email.clone();
        ctx.session.fill(&ctx.page, &input("email"), &email).await
    }

    async fn captcha_visible(&self, ctx: &mut RunContext<'_>) -> KensaResult<bool> {
        for text in embed::CAPTCHA_TEXTS {
            if ctx.count(&Selector::text(text)).await? > 0
                || ctx.count(&in_frame(Selector::text(text))).await? > 0
            {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl LeadGate for EmbedFormGate {
    fn name(&self) -> &'static str {
        "embed_form"
    }

    async fn apply(&self, ctx: &mut RunContext<'_>, _scenario: &Scenario) -> KensaResult<LeadOutcome> {
        let t = ctx.config.timeouts;
        ctx.expect_visible(&iframe(), t.screen, "embed_form_iframe_not_visible")
            .await?;

        if let Err(e) = self.submit(ctx).await {
            tracing::error!(error = %e, "empty submit failed");
            return Err(ctx.fail("embed_submit_click_failed_empty").await);
        }

        let errors = in_frame(Selector::text(embed::REQUIRED_ERROR_TEXT));
        let start = Instant::now();
        while ctx.count(&errors).await? == 0 {
            if start.elapsed() >= t.inline_errors {
                return Err(ctx.fail("embed_required_errors_not_found").await);
            }
            sleep(ctx.config.poll_interval).await;
        }

        if let Err(e) = self.fill_required(ctx).await {
            tracing::error!(error = %e, "filling embedded form failed");
            return Err(ctx.fail("embed_required_fill_failed").await);
        }
        ctx.pause().await;
        if let Err(e) = self.submit(ctx).await {
            tracing::error!(error = %e, "filled submit failed");
            return Err(ctx.fail("embed_submit_click_failed_filled").await);
        }

        // Watch for a CAPTCHA rejection until the form goes away.
        let start = Instant::now();
        while start.elapsed() < t.captcha_watch {
            if self.captcha_visible(ctx).await? {
                ctx.capture("embed_form_captcha").await;
                return Ok(LeadOutcome::Skip {
                    reason: "embed_form_captcha".to_string(),
                });
            }
            if !ctx.is_visible(&iframe()).await? {
                tracing::debug!("embedded form closed after submit");
                break;
            }
            sleep(ctx.config.poll_interval).await;
        }
        Ok(LeadOutcome::Continue(ctx.page.clone()))
    }
}
