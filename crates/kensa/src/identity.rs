//! Per-run user identity injected into content URLs.

use crate::result::{KensaError, KensaResult};
use crate::scenario::{ReusePolicy, Scenario};
use url::Url;
use uuid::Uuid;

/// Query key carrying the user identity
pub const USER_ID_KEY: &str = "userid";

/// Prefix marking identities created by the harness
pub const USER_ID_PREFIX: &str = "e2e_";

/// Fresh harness identity
#[must_use]
pub fn fresh_user_id() -> String {
    format!("{USER_ID_PREFIX}{}", Uuid::new_v4().simple())
}

/// Replace (or add) the `userid` query parameter, keeping every other one
pub fn with_user_id(url: &str, user_id: &str) -> KensaResult<String> {
    let mut parsed = Url::parse(url)
        .map_err(|e| KensaError::invalid_scenario(format!("url '{url}' is invalid: {e}")))?;
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != USER_ID_KEY)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    parsed
        .query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(USER_ID_KEY, user_id);
    Ok(parsed.into())
}

/// Address with a fresh random identity
pub fn with_random_user_id(url: &str) -> KensaResult<String> {
    with_user_id(url, &fresh_user_id())
}

/// Entry address for a run: randomized unless replay must reuse the identity
pub fn entry_url(scenario: &Scenario) -> KensaResult<String> {
    if scenario.lead_params.reuse_policy == ReusePolicy::MustReusable {
        Ok(scenario.url.clone())
    } else {
        with_random_user_id(&scenario.url)
    }
}
