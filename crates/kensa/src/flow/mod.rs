//! Content flows
//!
//! Each flow drives one scenario from Top to the replay check. A flow ends
//! in `Ok(())` (pass), a named failure, or [`KensaError::Skipped`] when a
//! lead gate reported a skip.

mod diagnose;
mod gacha;
mod paid;
mod result;
mod reuse;

pub use diagnose::run_diagnose;
pub use gacha::{run_gacha, CardResult};
pub use paid::purchase_if_paid;
pub use result::{
    consume_all, extract_details, extract_links, link_coverage_violation, open_links, unique_names, DetailItem,
    LinkItem,
};
pub use reuse::{attempt_start, check_reuse_policy, play_again, proceed_screens, Attempt};

use crate::context::RunContext;
use crate::lead::{run_lead, LeadOutcome, LeadPhase};
use crate::result::{KensaError, KensaResult};
use crate::scenario::Scenario;

/// Run the lead gate for `phase`, turning a gate skip into a skip error
async fn start_lead(ctx: &mut RunContext<'_>, scenario: &Scenario, phase: LeadPhase) -> KensaResult<()> {
    match run_lead(ctx, scenario, phase).await? {
        LeadOutcome::Continue(_) => Ok(()),
        LeadOutcome::Skip { reason } => {
            ctx.capture("lead_skipped").await;
            Err(KensaError::skipped(reason))
        }
    }
}
