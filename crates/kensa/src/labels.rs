//! Result-name extraction
//!
//! Result names (`結果A`, `結果B`, ...) are read from a detail block with one
//! fallback order. Each scope is tried in turn (the block, its parent, its
//! grandparent), and inside a scope the layers are:
//!
//! 1. known name containers (single and multi layouts, first ten of each)
//! 2. any `div` whose whole text is a result label
//! 3. the first `結果X` pattern found in the scope text

use crate::driver::{BrowserSession, PageId, Selector};
use crate::result::KensaResult;
use crate::selectors::gacha;
use regex::Regex;
use std::sync::OnceLock;

/// Labels every content ships with
pub const KNOWN_LABELS: [&str; 3] = ["結果A", "結果B", "結果C"];

/// Marker prefix of a result label
pub const LABEL_PREFIX: &str = "結果";

const MAX_LABEL_CHARS: usize = 8;
const MAX_CONTAINERS: usize = 10;

fn label_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^結果[Ａ-ＺA-Z0-9]+$").expect("static pattern"))
}

fn embedded_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"結果[Ａ-ＺA-Z0-9]+").expect("static pattern"))
}

fn alt_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"結果[ABC]").expect("static pattern"))
}

/// Whether a text is a result label
#[must_use]
pub fn is_result_label(text: &str) -> bool {
    let text = text.trim();
    KNOWN_LABELS.contains(&text)
        || (text.chars().count() <= MAX_LABEL_CHARS && label_pattern().is_match(text))
}

/// Texts that sit in name containers but are headings, not names
fn is_heading(text: &str) -> bool {
    text == LABEL_PREFIX || text.contains("詳細")
}

/// First `結果A`/`結果B`/`結果C` inside an image alt text
#[must_use]
pub fn pick_result_name(alt: &str) -> Option<String> {
    alt_pattern().find(alt).map(|m| m.as_str().to_string())
}

/// First embedded label in free text
#[must_use]
pub fn find_label_in_text(text: &str) -> Option<String> {
    embedded_pattern()
        .find_iter(text)
        .map(|m| m.as_str())
        .find(|s| s.chars().count() <= MAX_LABEL_CHARS)
        .map(str::to_string)
}

/// Extract the result name of a block, trying the block, its parent and its
/// grandparent in turn
pub async fn extract_result_name(
    session: &mut dyn BrowserSession,
    page: &PageId,
    block: &Selector,
) -> KensaResult<Option<String>> {
    for levels in 0..=2 {
        let scope = if levels == 0 {
            block.clone()
        } else {
            block.clone().parent(levels)
        };
        if let Some(name) = name_in_scope(session, page, &scope).await? {
            tracing::debug!(scope_level = levels, name = %name, "result name extracted");
            return Ok(Some(name));
        }
    }
    Ok(None)
}

async fn name_in_scope(
    session: &mut dyn BrowserSession,
    page: &PageId,
    scope: &Selector,
) -> KensaResult<Option<String>> {
    for container in [gacha::DETAIL_NAME_SINGLE, gacha::DETAIL_NAME_MULTI] {
        let hits = session
            .query(page, &scope.clone().find(Selector::css(container)))
            .await?;
        for info in hits.iter().take(MAX_CONTAINERS) {
            let text = info.text.trim();
            if text.is_empty() || is_heading(text) {
                continue;
            }
            if is_result_label(text) {
                return Ok(Some(text.to_string()));
            }
        }
    }

    let divs = session
        .query(page, &scope.clone().find(Selector::css("div")))
        .await?;
    if let Some(info) = divs.iter().find(|d| is_result_label(&d.text)) {
        return Ok(Some(info.text.trim().to_string()));
    }

    let own = session.query(page, scope).await?;
    Ok(own.first().and_then(|info| find_label_in_text(&info.text)))
}
