//! Result screen checks shared by the gacha and diagnose flows: detail
//! blocks, link-out items and consumption.

use crate::context::RunContext;
use crate::driver::Selector;
use crate::labels;
use crate::result::{KensaError, KensaResult};
use crate::screen;
use crate::selectors::gacha;
use serde::Serialize;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// How long the used marker may take to replace the use control
const USED_MARKER_WAIT: Duration = Duration::from_secs(20);

/// One extracted result detail block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetailItem {
    /// Zero-based block position
    pub index: usize,
    /// Result name (`結果A`, ...)
    pub name: String,
    /// Result image reference
    pub image_src: String,
    /// Result image alt text
    pub image_alt: String,
    /// Description text
    pub description: String,
}

/// One extracted link-out item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkItem {
    /// Zero-based item position
    pub index: usize,
    /// Destination address
    pub href: String,
    /// Button label
    pub label: String,
    /// Description text
    pub description: String,
}

fn rule(condition: &str, message: String) -> KensaError {
    KensaError::extraction(condition, message)
}

/// Attach `condition` to an extraction failure and capture it
async fn fatal<T>(
    ctx: &mut RunContext<'_>,
    condition: &str,
    result: KensaResult<T>,
) -> KensaResult<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) => {
            ctx.capture(condition).await;
            tracing::error!(condition, error = %e, "extraction failed");
            Err(match e {
                KensaError::Extraction { message, .. } => rule(condition, message),
                other => rule(condition, other.to_string()),
            })
        }
    }
}

// =============================================================================
// DETAILS
// =============================================================================

/// Read every detail block strictly; failures carry `condition`
pub async fn extract_details(
    ctx: &mut RunContext<'_>,
    draw_count: u32,
    condition: &str,
) -> KensaResult<Vec<DetailItem>> {
    let result = details_inner(ctx, draw_count, condition).await;
    fatal(ctx, condition, result).await
}

async fn details_inner(
    ctx: &mut RunContext<'_>,
    draw_count: u32,
    condition: &str,
) -> KensaResult<Vec<DetailItem>> {
    let blocks = gacha::detail_blocks(draw_count);
    let timeout = ctx.config.timeouts.slow_screen;
    if !ctx.wait_visible(&blocks.clone().first(), timeout).await? {
        return Err(rule(condition, format!("detail blocks not visible: {blocks}")));
    }

    let count = ctx.count(&blocks).await?;
    if count != draw_count as usize {
        return Err(rule(
            condition,
            format!("detail count expected={draw_count} actual={count}"),
        ));
    }

    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let block = blocks.clone().nth(i);

        let images = ctx
            .query(&block.clone().find(Selector::css(gacha::DETAIL_RESULT_IMAGE)))
            .await?;
        if images.len() != 1 {
            return Err(rule(
                condition,
                format!("[detail {i}] expected one result image, found {}", images.len()),
            ));
        }
        let image_src = images[0].attr_or_empty("src").to_string();
        let image_alt = images[0].attr_or_empty("alt").to_string();
        if image_src.is_empty() {
            return Err(rule(condition, format!("[detail {i}] result image src is empty")));
        }
        if !image_alt.starts_with(labels::LABEL_PREFIX) {
            return Err(rule(
                condition,
                format!("[detail {i}] unexpected result image alt '{image_alt}'"),
            ));
        }

        let page = ctx.page.clone();
        let Some(name) = labels::extract_result_name(ctx.session, &page, &block).await? else {
            return Err(rule(condition, format!("[detail {i}] result name not found")));
        };

        let description = ctx
            .first(&block.clone().find(Selector::css(gacha::DETAIL_DESC_TEXT)))
            .await?
            .map(|d| d.text.trim().to_string())
            .unwrap_or_default();
        if description.is_empty() {
            return Err(rule(condition, format!("[detail {i}] description is missing")));
        }

        let desc_images = ctx
            .count(&block.clone().find(Selector::css(gacha::DETAIL_DESC_IMAGE)))
            .await?;
        if desc_images != 1 {
            return Err(rule(
                condition,
                format!("[detail {i}] expected one description image, found {desc_images}"),
            ));
        }

        if ctx.count(&block.find(gacha::use_button())).await? == 0 {
            return Err(rule(condition, format!("[detail {i}] use control not found")));
        }

        tracing::debug!(index = i, name = %name, src = %image_src, "detail block");
        out.push(DetailItem {
            index: i,
            name,
            image_src,
            image_alt,
            description,
        });
    }
    Ok(out)
}

// =============================================================================
// LINKS
// =============================================================================

fn link_item(index: usize) -> Selector {
    Selector::css(gacha::LINK_ITEM).nth(index)
}

fn link_anchor(index: usize) -> Selector {
    link_item(index).find(Selector::css(gacha::LINK_ANCHOR)).first()
}

/// Read every link-out item strictly; failures carry `condition`
pub async fn extract_links(ctx: &mut RunContext<'_>, condition: &str) -> KensaResult<Vec<LinkItem>> {
    let result = links_inner(ctx, condition).await;
    fatal(ctx, condition, result).await
}

async fn links_inner(ctx: &mut RunContext<'_>, condition: &str) -> KensaResult<Vec<LinkItem>> {
    let count = ctx.count(&Selector::css(gacha::LINK_ITEM)).await?;
    if count == 0 {
        return Err(rule(condition, "link items not found".to_string()));
    }

    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let item = link_item(i);
        let description = ctx
            .first(&item.clone().find(Selector::css(gacha::LINK_DESC_TEXT)))
            .await?
            .map(|d| d.text.trim().to_string())
            .unwrap_or_default();
        if description.is_empty() {
            return Err(rule(condition, format!("link description missing index={i}")));
        }
        if ctx
            .count(&item.clone().find(Selector::css(gacha::LINK_DESC_IMAGE)))
            .await?
            == 0
        {
            return Err(rule(condition, format!("link image missing index={i}")));
        }

        let anchor = ctx.first(&link_anchor(i)).await?;
        let href = anchor
            .as_ref()
            .map(|a| a.attr_or_empty("href").to_string())
            .unwrap_or_default();
        if href.is_empty() {
            return Err(rule(condition, format!("link href missing index={i}")));
        }

        let label = match ctx
            .first(&item.find(Selector::css(gacha::LINK_BUTTON_TEXT)))
            .await?
        {
            Some(text) => text.text.trim().to_string(),
            None => anchor.map(|a| a.text.trim().to_string()).unwrap_or_default(),
        };
        if label.is_empty() {
            return Err(rule(condition, format!("link label missing index={i}")));
        }

        out.push(LinkItem {
            index: i,
            href,
            label,
            description,
        });
    }
    Ok(out)
}

/// Distinct names in first-seen order
#[must_use]
pub fn unique_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        if !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}

/// Coverage rule between link labels and result names
///
/// Every link must mention one of the names and every name must have at
/// least one link. Returns the failing condition, with `tag` inserted after
/// the condition stem (`""` or `"_single"`).
#[must_use]
pub fn link_coverage_violation(links: &[LinkItem], names: &[String], tag: &str) -> Option<String> {
    let mut counts = vec![0usize; names.len()];
    for link in links {
        match names.iter().position(|n| link.label.contains(n.as_str())) {
            Some(pos) => counts[pos] += 1,
            None => return Some(format!("link_not_matched{tag}_{}", link.index)),
        }
    }
    names
        .iter()
        .zip(counts)
        .find(|(_, count)| *count == 0)
        .map(|(name, count)| format!("link_count_invalid{tag}_{name}_{count}"))
}

/// Open every link in a new page, compare the address and close it
pub async fn open_links(ctx: &mut RunContext<'_>, links: &[LinkItem]) -> KensaResult<()> {
    let popup = ctx.config.timeouts.popup;
    for link in links {
        ctx.pause().await;
        let opened = match ctx.click_for_new_page(&link_anchor(link.index), popup).await {
            Ok(Some(page)) => page,
            Ok(None) | Err(_) => {
                return Err(ctx.fail(&format!("link_open_failed_{}", link.index)).await);
            }
        };
        let url = ctx.wait_for_address(&opened, popup).await;
        let matches = url.contains(&link.href) || url.starts_with(&link.href);
        if !matches {
            tracing::error!(href = %link.href, url = %url, "link opened a different page");
            let err = ctx.fail(&format!("link_url_mismatch_{}", link.index)).await;
            ctx.close_quietly(&opened).await;
            return Err(err);
        }
        ctx.close_quietly(&opened).await;
    }
    Ok(())
}

// =============================================================================
// CONSUMPTION
// =============================================================================

/// First non-empty match of `control` inside the block, its parent or its
/// grandparent
async fn control_near(
    ctx: &mut RunContext<'_>,
    block: &Selector,
    control: &Selector,
) -> KensaResult<Option<Selector>> {
    for levels in 0..=2 {
        let scope = if levels == 0 {
            block.clone()
        } else {
            block.clone().parent(levels)
        };
        let candidate = scope.find(control.clone()).first();
        if ctx.count(&candidate).await? > 0 {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

/// Poll [`control_near`] until a visible control shows up
async fn wait_control_near(
    ctx: &mut RunContext<'_>,
    block: &Selector,
    control: &Selector,
    timeout: Duration,
) -> KensaResult<Option<Selector>> {
    let start = Instant::now();
    loop {
        if let Some(found) = control_near(ctx, block, control).await? {
            if ctx.is_visible(&found).await? {
                return Ok(Some(found));
            }
        }
        if start.elapsed() >= timeout {
            return Ok(None);
        }
        sleep(ctx.config.poll_interval).await;
    }
}

/// Consume every result block in order
///
/// Each use goes through the confirmation dialog, must mark only that block
/// as used, and must leave every other unused block usable.
pub async fn consume_all(ctx: &mut RunContext<'_>, blocks: &Selector, names: &[String]) -> KensaResult<()> {
    let t = ctx.config.timeouts;
    let n = ctx.count(blocks).await?;
    if n == 0 {
        return Err(ctx.fail("use_no_detail_blocks").await);
    }
    if names.len() != n {
        return Err(ctx.fail("use_detail_names_len_mismatch").await);
    }

    let modal = gacha::use_modal();
    let mut used = vec![false; n];
    for i in 0..n {
        let k = i + 1;
        let block = blocks.clone().nth(i);

        let Some(button) = control_near(ctx, &block, &gacha::use_button()).await? else {
            return Err(ctx.fail(&format!("use_btn_missing_{k}")).await);
        };
        ctx.pause().await;
        if ctx.safe_click(&button).await.is_err() {
            return Err(ctx.fail(&format!("use_btn_click_failed_{k}")).await);
        }

        if !ctx.wait_visible(&modal, t.popup).await? {
            return Err(ctx.fail(&format!("use_modal_not_visible_{k}")).await);
        }
        let text = ctx
            .first(&modal)
            .await?
            .map(|m| m.text.replace('\n', " "))
            .unwrap_or_default();
        if !text.contains(gacha::MODAL_MESSAGE) {
            return Err(ctx.fail(&format!("use_modal_notice_missing_{k}")).await);
        }
        if !names[i].is_empty() && !text.contains(&names[i]) {
            tracing::error!(expected = %names[i], modal = %text, "dialog names another result");
            return Err(ctx.fail(&format!("use_modal_name_mismatch_{k}")).await);
        }
        let back = modal.clone().find(Selector::exact_text(gacha::MODAL_BACK_TEXT));
        if ctx.count(&back).await? == 0 {
            return Err(ctx.fail(&format!("use_modal_back_missing_{k}")).await);
        }
        let confirm = modal.clone().find(Selector::exact_text(gacha::MODAL_USE_TEXT)).first();
        if ctx.count(&confirm).await? == 0 {
            return Err(ctx.fail(&format!("use_modal_use_missing_{k}")).await);
        }

        ctx.pause().await;
        ctx.safe_click(&confirm).await?;
        let opts = ctx.wait(t.popup);
        if !screen::wait_hidden(ctx.session, &ctx.page, &modal, opts).await? {
            return Err(ctx.fail(&format!("use_modal_not_closed_{k}")).await);
        }

        let marker = wait_control_near(ctx, &block, &gacha::used_button(), USED_MARKER_WAIT).await?;
        let Some(marker) = marker else {
            return Err(ctx.fail(&format!("not_marked_used_{k}")).await);
        };
        if ctx.first(&marker).await?.is_some_and(|m| m.enabled) {
            return Err(ctx.fail(&format!("used_still_enabled_{k}")).await);
        }
        used[i] = true;
        tracing::info!(block = k, name = %names[i], "result consumed");

        for (j, done) in used.iter().enumerate() {
            if *done {
                continue;
            }
            let other = blocks.clone().nth(j);
            if control_near(ctx, &other, &gacha::use_button()).await?.is_some() {
                continue;
            }
            let condition = if control_near(ctx, &other, &gacha::used_button()).await?.is_some() {
                format!("unexpected_used_{k}_affects_{}", j + 1)
            } else {
                format!("other_should_be_usable_{k}_but_{}_missing", j + 1)
            };
            return Err(ctx.fail(&condition).await);
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn link(index: usize, label: &str) -> LinkItem {
        LinkItem {
            index,
            href: format!("https://shop.example/{index}"),
            label: label.to_string(),
            description: "desc".to_string(),
        }
    }

    mod coverage_tests {
        use super::*;

        #[test]
        fn test_unique_names_keep_order() {
            assert_eq!(
                unique_names(["結果B", "結果A", "結果B"]),
                vec!["結果B".to_string(), "結果A".to_string()]
            );
        }

        #[test]
        fn test_every_link_matched_and_every_name_linked() {
            let names = unique_names(["結果A", "結果B"]);
            let links = [link(0, "結果Aを見る"), link(1, "結果Bを見る")];
            assert_eq!(link_coverage_violation(&links, &names, ""), None);
        }

        #[test]
        fn test_unmatched_link() {
            let names = unique_names(["結果A"]);
            let links = [link(0, "結果Aを見る"), link(1, "ほかの商品")];
            assert_eq!(
                link_coverage_violation(&links, &names, "_single").as_deref(),
                Some("link_not_matched_single_1")
            );
        }

        #[test]
        fn test_name_without_link() {
            let names = unique_names(["結果A", "結果C"]);
            let links = [link(0, "結果A")];
            assert_eq!(
                link_coverage_violation(&links, &names, "").as_deref(),
                Some("link_count_invalid_結果C_0")
            );
        }
    }

    mod open_tests {
        use super::*;
        use crate::artifacts::Artifacts;
        use crate::config::HarnessConfig;
        use crate::driver::{BrowserSession, ClickOptions, ElementInfo, PageId};
        use crate::mock::{MockApp, MockNode, MockPage, MockSession};
        use async_trait::async_trait;
        use std::collections::HashMap;
        use tempfile::TempDir;

        struct Shop;

        impl MockApp for Shop {
            fn render(&mut self, _page: &MockPage) -> MockNode {
                MockNode::new("body").child(
                    MockNode::div().class("css-1uom0pk").child(
                        MockNode::link("https://shop.example/0")
                            .attr("target", "_blank")
                            .text("結果Aを見る"),
                    ),
                )
            }
        }

        /// New pages report `about:blank` for their first few address reads
        struct Lagging {
            inner: MockSession,
            blank_reads: usize,
            reads: HashMap<PageId, usize>,
        }

        #[async_trait]
        impl BrowserSession for Lagging {
            fn main_page(&self) -> PageId {
                self.inner.main_page()
            }
            async fn goto(&mut self, page: &PageId, url: &str) -> KensaResult<()> {
                self.inner.goto(page, url).await
            }
            async fn pages(&mut self) -> KensaResult<Vec<PageId>> {
                self.inner.pages().await
            }
            async fn url(&mut self, page: &PageId) -> KensaResult<String> {
                let seen = self.reads.entry(page.clone()).or_default();
                *seen += 1;
                if *page != self.inner.main_page() && *seen <= self.blank_reads {
                    return Ok("about:blank".to_string());
                }
                self.inner.url(page).await
            }
            async fn query(&mut self, page: &PageId, selector: &Selector) -> KensaResult<Vec<ElementInfo>> {
                self.inner.query(page, selector).await
            }
            async fn click(&mut self, page: &PageId, selector: &Selector, options: ClickOptions) -> KensaResult<()> {
                self.inner.click(page, selector, options).await
            }
            async fn fill(&mut self, page: &PageId, selector: &Selector, value: &str) -> KensaResult<()> {
                self.inner.fill(page, selector, value).await
            }
            async fn select_option(&mut self, page: &PageId, selector: &Selector, value: &str) -> KensaResult<()> {
                self.inner.select_option(page, selector, value).await
            }
            async fn bring_to_front(&mut self, page: &PageId) -> KensaResult<()> {
                self.inner.bring_to_front(page).await
            }
            async fn close_page(&mut self, page: &PageId) -> KensaResult<()> {
                self.inner.close_page(page).await
            }
            async fn screenshot(&mut self, page: &PageId) -> KensaResult<Vec<u8>> {
                self.inner.screenshot(page).await
            }
            async fn content(&mut self, page: &PageId) -> KensaResult<String> {
                self.inner.content(page).await
            }
        }

        async fn open_with_lag(blank_reads: usize, href: &str) -> KensaResult<()> {
            let tmp = TempDir::new().unwrap();
            let mut session = Lagging {
                inner: MockSession::new(Shop),
                blank_reads,
                reads: HashMap::new(),
            };
            let page = session.main_page();
            session.goto(&page, "https://example.com/g/1").await.unwrap();
            let config = HarnessConfig::new();
            let mut artifacts = Artifacts::new(tmp.path(), "g1");
            let mut ctx = RunContext::new(&mut session, &config, &mut artifacts);
            let links = [LinkItem {
                href: href.to_string(),
                ..link(0, "結果Aを見る")
            }];
            open_links(&mut ctx, &links).await
        }

        #[tokio::test(start_paused = true)]
        async fn test_link_checked_after_popup_navigates() {
            open_with_lag(3, "https://shop.example/0").await.unwrap();
        }

        #[tokio::test(start_paused = true)]
        async fn test_link_to_other_address_still_fails() {
            let err = open_with_lag(1, "https://shop.example/other").await.unwrap_err();
            assert_eq!(err.condition(), Some("link_url_mismatch_0"));
        }
    }
}
