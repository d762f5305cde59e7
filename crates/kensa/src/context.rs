//! Per-run state shared by lead gates and content flows.

use crate::artifacts::Artifacts;
use crate::config::HarnessConfig;
use crate::driver::{self, BrowserSession, ClickOptions, ElementInfo, PageId, Selector};
use crate::result::{KensaError, KensaResult};
use crate::screen::{self, WaitOptions};
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Session, configuration and artifact sink for one scenario run
///
/// `page` is the page the flow currently works on. Lead gates may move it
/// (a LINE login can bring the content back in another tab).
pub struct RunContext<'a> {
    /// Exclusively owned browser session
    pub session: &'a mut dyn BrowserSession,
    /// Harness configuration
    pub config: &'a HarnessConfig,
    /// Artifact sink of this scenario
    pub artifacts: &'a mut Artifacts,
    /// Current content page
    pub page: PageId,
}

impl std::fmt::Debug for RunContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("page", &self.page)
            .field("artifacts", &self.artifacts)
            .finish_non_exhaustive()
    }
}

impl<'a> RunContext<'a> {
    /// Context starting on the session's main page
    pub fn new(
        session: &'a mut dyn BrowserSession,
        config: &'a HarnessConfig,
        artifacts: &'a mut Artifacts,
    ) -> Self {
        let page = session.main_page();
        Self {
            session,
            config,
            artifacts,
            page,
        }
    }

    /// Wait budget with the configured poll interval
    #[must_use]
    pub fn wait(&self, timeout: Duration) -> WaitOptions {
        WaitOptions::new(timeout, self.config.poll_interval)
    }

    // -------------------------------------------------------------------------
    // Failure reporting
    // -------------------------------------------------------------------------

    /// Capture `condition` on the current page and build the failure
    pub async fn fail(&mut self, condition: &str) -> KensaError {
        let page = self.page.clone();
        self.fail_on(&page, condition).await
    }

    /// Capture `condition` on a specific page and build the failure
    pub async fn fail_on(&mut self, page: &PageId, condition: &str) -> KensaError {
        self.artifacts.capture(self.session, page, condition).await;
        tracing::error!(condition, page = %page, "verification failed");
        KensaError::mismatch(condition)
    }

    /// Fail with `condition` unless `ok`
    pub async fn ensure(&mut self, ok: bool, condition: &str) -> KensaResult<()> {
        if ok {
            Ok(())
        } else {
            Err(self.fail(condition).await)
        }
    }

    /// Save an artifact without failing
    pub async fn capture(&mut self, condition: &str) {
        let page = self.page.clone();
        self.artifacts.capture(self.session, &page, condition).await;
    }

    // -------------------------------------------------------------------------
    // Page access
    // -------------------------------------------------------------------------

    /// Snapshot every match on the current page
    pub async fn query(&mut self, selector: &Selector) -> KensaResult<Vec<ElementInfo>> {
        self.session.query(&self.page, selector).await
    }

    /// Snapshot of the first match on the current page
    pub async fn first(&mut self, selector: &Selector) -> KensaResult<Option<ElementInfo>> {
        driver::first(self.session, &self.page, selector).await
    }

    /// Number of matches on the current page
    pub async fn count(&mut self, selector: &Selector) -> KensaResult<usize> {
        self.session.count(&self.page, selector).await
    }

    /// Whether any match is visible now
    pub async fn is_visible(&mut self, selector: &Selector) -> KensaResult<bool> {
        driver::is_visible(self.session, &self.page, selector).await
    }

    /// Wait for a visible match
    pub async fn wait_visible(&mut self, selector: &Selector, timeout: Duration) -> KensaResult<bool> {
        let opts = self.wait(timeout);
        screen::wait_visible(self.session, &self.page, selector, opts).await
    }

    /// Wait for a visible match, failing with `condition`
    pub async fn expect_visible(
        &mut self,
        selector: &Selector,
        timeout: Duration,
        condition: &str,
    ) -> KensaResult<()> {
        let shown = self.wait_visible(selector, timeout).await?;
        self.ensure(shown, condition).await
    }

    /// Plain click on the first match
    pub async fn click(&mut self, selector: &Selector) -> KensaResult<()> {
        self.session
            .click(&self.page, selector, ClickOptions::default())
            .await
    }

    /// Click, retrying once with a forced click
    pub async fn safe_click(&mut self, selector: &Selector) -> KensaResult<()> {
        let page = self.page.clone();
        safe_click_on(self.session, &page, selector).await
    }

    /// Click a link and wait for the page it opens; `None` when no new page
    /// shows up within `timeout`
    pub async fn click_for_new_page(
        &mut self,
        selector: &Selector,
        timeout: Duration,
    ) -> KensaResult<Option<PageId>> {
        let before = self.session.pages().await?;
        self.safe_click(selector).await?;
        let start = Instant::now();
        loop {
            let opened = self
                .session
                .pages()
                .await?
                .into_iter()
                .find(|p| !before.contains(p));
            if opened.is_some() {
                return Ok(opened);
            }
            if start.elapsed() >= timeout {
                return Ok(None);
            }
            sleep(self.config.poll_interval).await;
        }
    }

    /// Wait for a freshly opened page to leave `about:blank`
    ///
    /// Returns the last address read, which is still blank when the page
    /// never navigated within `timeout`.
    pub async fn wait_for_address(&mut self, page: &PageId, timeout: Duration) -> String {
        let start = Instant::now();
        loop {
            let url = self.session.url(page).await.unwrap_or_default();
            if !is_blank(&url) || start.elapsed() >= timeout {
                return url;
            }
            sleep(self.config.poll_interval).await;
        }
    }

    /// Close a page, ignoring failures
    pub async fn close_quietly(&mut self, page: &PageId) {
        if let Err(e) = self.session.close_page(page).await {
            tracing::debug!(page = %page, error = %e, "close failed");
        }
    }

    /// Pause between visual steps (zero under CI)
    pub async fn pause(&mut self) {
        if !self.config.demo_pause.is_zero() {
            sleep(self.config.demo_pause).await;
        }
    }
}

fn is_blank(url: &str) -> bool {
    url.is_empty() || url == "about:blank"
}

/// Click on a given page, falling back to a forced click
pub async fn safe_click_on(
    session: &mut dyn BrowserSession,
    page: &PageId,
    selector: &Selector,
) -> KensaResult<()> {
    match session.click(page, selector, ClickOptions::default()).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::debug!(selector = %selector, error = %e, "click failed, forcing");
            session.click(page, selector, ClickOptions::forced()).await
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mock::{MockApp, MockEvent, MockNode, MockPage, MockSession, MockWorld};
    use tempfile::TempDir;

    #[derive(Default)]
    struct Covered {
        clicks: u32,
    }

    impl MockApp for Covered {
        fn render(&mut self, _page: &MockPage) -> MockNode {
            MockNode::new("body").children([
                MockNode::button(format!("n={}", self.clicks))
                    .attr("style", "pointer-events: none")
                    .on_click("hit"),
                MockNode::div().text("banner"),
            ])
        }

        fn handle(&mut self, event: &MockEvent, _world: &mut MockWorld<'_>) {
            if matches!(event, MockEvent::Click { action } if action == "hit") {
                self.clicks += 1;
            }
        }
    }

    #[tokio::test]
    async fn test_safe_click_forces_after_failure() {
        let tmp = TempDir::new().unwrap();
        let mut session = MockSession::new(Covered::default());
        let config = HarnessConfig::new();
        let mut artifacts = Artifacts::new(tmp.path(), "ctx");
        let mut ctx = RunContext::new(&mut session, &config, &mut artifacts);

        let button = Selector::css("button");
        assert!(ctx.click(&button).await.is_err());
        ctx.safe_click(&button).await.unwrap();
        assert!(ctx.is_visible(&Selector::text("n=1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_ensure_captures_named_artifact() {
        let tmp = TempDir::new().unwrap();
        let mut session = MockSession::new(Covered::default());
        let config = HarnessConfig::new();
        let mut artifacts = Artifacts::new(tmp.path(), "ctx");
        let mut ctx = RunContext::new(&mut session, &config, &mut artifacts);

        ctx.ensure(true, "never").await.unwrap();
        let err = ctx.ensure(false, "banner_missing").await.unwrap_err();
        assert_eq!(err.condition(), Some("banner_missing"));
        assert!(tmp.path().join("ctx/banner_missing.png").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expect_visible_times_out() {
        let tmp = TempDir::new().unwrap();
        let mut session = MockSession::new(Covered::default());
        let config = HarnessConfig::new();
        let mut artifacts = Artifacts::new(tmp.path(), "ctx");
        let mut ctx = RunContext::new(&mut session, &config, &mut artifacts);

        ctx.expect_visible(&Selector::text("banner"), Duration::from_secs(1), "x")
            .await
            .unwrap();
        let err = ctx
            .expect_visible(&Selector::text("absent"), Duration::from_secs(1), "absent_missing")
            .await
            .unwrap_err();
        assert_eq!(err.condition(), Some("absent_missing"));
    }
}
